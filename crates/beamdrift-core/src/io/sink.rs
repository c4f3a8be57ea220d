use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::fsc::FscTable;
use crate::geometry::mean_track;
use crate::pipeline::{MetadataShifts, Micrograph, MicrographMotion, MicrographSource, MotionSink};

use super::image_io::{save_png, tile_horizontally};
use super::mrc::{read_mrc, write_mrc};
use super::tracks::{read_tracks, write_global_track, write_tracks, write_visual_tracks};

const TRACKS_SUFFIX: &str = "_tracks.dat";
const FCC_DATA_SUFFIX: &str = "_FCC_cc.mrc";
const FCC_WEIGHT0_SUFFIX: &str = "_FCC_w0.mrc";
const FCC_WEIGHT1_SUFFIX: &str = "_FCC_w1.mrc";
const VIS_TRACKS_SUFFIX: &str = "_visTracks.dat";
const GLOBAL_TRACK_SUFFIX: &str = "_globTrack.dat";
const CC_SUM_SUFFIX: &str = "_CCsum.png";

/// Writes every micrograph's results into an output directory, named after
/// the micrograph.
pub struct DirectorySink {
    root: PathBuf,
    diagnostics: bool,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, diagnostics: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, diagnostics })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str, suffix: &str) -> Result<PathBuf> {
        let path = self.root.join(format!("{name}{suffix}"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

impl MotionSink for DirectorySink {
    fn write(&mut self, motion: &MicrographMotion) -> Result<()> {
        let name = motion.name.as_str();
        let total = motion.total_tracks();

        write_tracks(&self.path(name, TRACKS_SUFFIX)?, &total)?;
        write_fsc_table(&self.root, name, &motion.fsc)?;

        if self.diagnostics {
            write_visual_tracks(
                &self.path(name, VIS_TRACKS_SUFFIX)?,
                &motion.positions,
                &total,
            )?;
            // The mean over total tracks, whether or not the global motion
            // was regularized into the particle tracks.
            write_global_track(&self.path(name, GLOBAL_TRACK_SUFFIX)?, &mean_track(&total))?;
            if let Some(sums) = &motion.correlation_sums {
                let frames: Vec<_> = sums.iter().map(|v| v.data()).collect();
                save_png(&tile_horizontally(&frames), &self.path(name, CC_SUM_SUFFIX)?)?;
            }
        }

        debug!(micrograph = name, dir = %self.root.display(), "Results written");
        Ok(())
    }
}

/// Persist the three FSC arrays of one micrograph as MRC maps.
pub fn write_fsc_table(root: &Path, name: &str, table: &FscTable) -> Result<()> {
    let base = root.join(name);
    if let Some(parent) = base.parent() {
        fs::create_dir_all(parent)?;
    }
    write_mrc(&with_suffix(&base, FCC_DATA_SUFFIX), &table.data)?;
    write_mrc(&with_suffix(&base, FCC_WEIGHT0_SUFFIX), &table.weight0)?;
    write_mrc(&with_suffix(&base, FCC_WEIGHT1_SUFFIX), &table.weight1)?;
    Ok(())
}

/// Read back the FSC arrays written by [`write_fsc_table`].
pub fn read_fsc_table(root: &Path, name: &str) -> Result<FscTable> {
    let base = root.join(name);
    Ok(FscTable {
        data: read_mrc(&with_suffix(&base, FCC_DATA_SUFFIX))?,
        weight0: read_mrc(&with_suffix(&base, FCC_WEIGHT0_SUFFIX))?,
        weight1: read_mrc(&with_suffix(&base, FCC_WEIGHT1_SUFFIX))?,
    })
}

/// Read the total tracks written for micrograph `name` back as stored
/// shifts; the global part is their per-frame mean.
pub fn read_motion_shifts(root: &Path, name: &str) -> Result<MetadataShifts> {
    let particles = read_tracks(&with_suffix(&root.join(name), TRACKS_SUFFIX))?;
    Ok(MetadataShifts {
        global: mean_track(&particles),
        particles,
    })
}

/// Attaches the tracks of a previous run in `root` to every micrograph of
/// `inner`. Micrographs without a track file load unchanged.
pub struct StoredShiftsSource<'a> {
    inner: &'a dyn MicrographSource,
    root: PathBuf,
}

impl<'a> StoredShiftsSource<'a> {
    pub fn new(inner: &'a dyn MicrographSource, root: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            root: root.into(),
        }
    }
}

impl MicrographSource for StoredShiftsSource<'_> {
    fn micrograph_count(&self) -> usize {
        self.inner.micrograph_count()
    }

    fn load(&self, index: usize) -> Result<Micrograph> {
        let mut micrograph = self.inner.load(index)?;
        if with_suffix(&self.root.join(&micrograph.name), TRACKS_SUFFIX).is_file() {
            micrograph.shifts = Some(read_motion_shifts(&self.root, &micrograph.name)?);
            debug!(
                micrograph = %micrograph.name,
                dir = %self.root.display(),
                "Stored shifts attached"
            );
        }
        Ok(micrograph)
    }
}

/// Names of all micrographs with FSC tables directly inside `root`, sorted.
pub fn find_fsc_tables(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = file_name.strip_suffix(FCC_DATA_SUFFIX) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
