use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::Result;

/// Save `data` as an 8-bit grayscale PNG, stretched so that its minimum
/// maps to black and its maximum to white.
pub fn save_png(data: &Array2<f64>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let (min, max) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in data.indexed_iter() {
        let t = if range > 0.0 && v.is_finite() {
            (v - min) / range
        } else {
            0.0
        };
        let val = (t.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Lay the frames out side by side in a single strip.
pub fn tile_horizontally(frames: &[&Array2<f64>]) -> Array2<f64> {
    let h = frames.iter().map(|f| f.nrows()).max().unwrap_or(0);
    let w: usize = frames.iter().map(|f| f.ncols()).sum();

    let mut out = Array2::<f64>::zeros((h, w));
    let mut x0 = 0;
    for frame in frames {
        let (fh, fw) = frame.dim();
        out.slice_mut(ndarray::s![..fh, x0..x0 + fw]).assign(frame);
        x0 += fw;
    }
    out
}
