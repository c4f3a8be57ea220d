//! Minimal MRC support: single-section float32 (mode 2) maps, enough to
//! persist per-frame FSC tables.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{DriftError, Result};

pub const MRC_HEADER_SIZE: usize = 1024;
const MODE_FLOAT32: i32 = 2;
const MAP_TAG: &[u8; 4] = b"MAP ";
// Little-endian machine stamp.
const MACHINE_STAMP: [u8; 4] = [0x44, 0x44, 0x00, 0x00];

/// The fields of the 1024-byte MRC header this crate reads or writes.
#[derive(Clone, Debug, PartialEq)]
pub struct MrcHeader {
    /// Columns (fastest axis).
    pub nx: usize,
    /// Rows.
    pub ny: usize,
    /// Sections.
    pub nz: usize,
    pub mode: i32,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub rms: f32,
}

impl MrcHeader {
    fn for_data(data: &Array2<f64>) -> Self {
        let (ny, nx) = data.dim();
        let n = (nx * ny).max(1) as f64;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &v in data.iter() {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / n;
        let var = data.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
        if data.is_empty() {
            (min, max) = (0.0, 0.0);
        }

        Self {
            nx,
            ny,
            nz: 1,
            mode: MODE_FLOAT32,
            min: min as f32,
            max: max as f32,
            mean: mean as f32,
            rms: var.sqrt() as f32,
        }
    }

    fn data_size(&self) -> usize {
        self.nx * self.ny * self.nz * 4
    }
}

/// Write `data` (rows, columns) as a float32 MRC map.
pub fn write_mrc(path: &Path, data: &Array2<f64>) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    let header = MrcHeader::for_data(data);
    write_header(&mut w, &header)?;
    for &v in data.iter() {
        w.write_f32::<LittleEndian>(v as f32)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a single-section float32 MRC map into a (rows, columns) array.
pub fn read_mrc(path: &Path) -> Result<Array2<f64>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < MRC_HEADER_SIZE {
        return Err(DriftError::InvalidMrc("file too small for MRC header".into()));
    }
    let header = parse_header(&mmap[..MRC_HEADER_SIZE])?;
    let extended = {
        let mut cursor = Cursor::new(&mmap[92..96]);
        cursor.read_i32::<LittleEndian>()?.max(0) as usize
    };

    let start = MRC_HEADER_SIZE + extended;
    let end = start + header.data_size();
    if mmap.len() < end {
        return Err(DriftError::InvalidMrc(format!(
            "file truncated: expected at least {end} bytes, got {}",
            mmap.len()
        )));
    }

    let mut cursor = Cursor::new(&mmap[start..end]);
    let mut values = Vec::with_capacity(header.nx * header.ny);
    for _ in 0..header.nx * header.ny {
        values.push(cursor.read_f32::<LittleEndian>()? as f64);
    }
    Array2::from_shape_vec((header.ny, header.nx), values)
        .map_err(|e| DriftError::InvalidMrc(e.to_string()))
}

pub fn parse_header(buf: &[u8]) -> Result<MrcHeader> {
    let mut cursor = Cursor::new(buf);
    let nx = cursor.read_i32::<LittleEndian>()?;
    let ny = cursor.read_i32::<LittleEndian>()?;
    let nz = cursor.read_i32::<LittleEndian>()?;
    let mode = cursor.read_i32::<LittleEndian>()?;

    if nx <= 0 || ny <= 0 || nz <= 0 {
        return Err(DriftError::InvalidMrc(format!(
            "invalid dimensions {nx} x {ny} x {nz}"
        )));
    }
    if mode != MODE_FLOAT32 {
        return Err(DriftError::InvalidMrc(format!(
            "unsupported mode {mode}, only float32 (2) is read"
        )));
    }
    if nz != 1 {
        return Err(DriftError::InvalidMrc(format!(
            "expected a single section, found {nz}"
        )));
    }

    // dmin, dmax, dmean at words 19..22, rms at word 54.
    let mut cursor = Cursor::new(&buf[76..88]);
    let min = cursor.read_f32::<LittleEndian>()?;
    let max = cursor.read_f32::<LittleEndian>()?;
    let mean = cursor.read_f32::<LittleEndian>()?;
    let rms = Cursor::new(&buf[216..220]).read_f32::<LittleEndian>()?;

    Ok(MrcHeader {
        nx: nx as usize,
        ny: ny as usize,
        nz: nz as usize,
        mode,
        min,
        max,
        mean,
        rms,
    })
}

fn write_header(w: &mut impl Write, header: &MrcHeader) -> Result<()> {
    let dims = [header.nx as i32, header.ny as i32, header.nz as i32];

    for d in dims {
        w.write_i32::<LittleEndian>(d)?;
    }
    w.write_i32::<LittleEndian>(header.mode)?;
    // nxstart, nystart, nzstart
    for _ in 0..3 {
        w.write_i32::<LittleEndian>(0)?;
    }
    // mx, my, mz
    for d in dims {
        w.write_i32::<LittleEndian>(d)?;
    }
    // Cell lengths in pixels, then angles.
    for d in dims {
        w.write_f32::<LittleEndian>(d as f32)?;
    }
    for _ in 0..3 {
        w.write_f32::<LittleEndian>(90.0)?;
    }
    // mapc, mapr, maps
    for axis in 1..=3 {
        w.write_i32::<LittleEndian>(axis)?;
    }
    w.write_f32::<LittleEndian>(header.min)?;
    w.write_f32::<LittleEndian>(header.max)?;
    w.write_f32::<LittleEndian>(header.mean)?;
    // ispg, nsymbt
    w.write_i32::<LittleEndian>(0)?;
    w.write_i32::<LittleEndian>(0)?;
    // extra (25 words)
    w.write_all(&[0u8; 100])?;
    // origin
    for _ in 0..3 {
        w.write_f32::<LittleEndian>(0.0)?;
    }
    w.write_all(MAP_TAG)?;
    w.write_all(&MACHINE_STAMP)?;
    w.write_f32::<LittleEndian>(header.rms)?;
    // nlabl, then ten empty 80-byte labels
    w.write_i32::<LittleEndian>(0)?;
    w.write_all(&[0u8; 800])?;
    Ok(())
}
