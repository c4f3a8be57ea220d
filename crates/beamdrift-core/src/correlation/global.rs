//! Micrograph-wide initial motion: the global track shared by all particles
//! and the static per-particle offsets relative to it.

use ndarray::Array2;
use rayon::prelude::*;

use crate::geometry::{Position, Track};

use super::subpixel::refine_peak_paraboloid;
use super::{CorrelationSet, CorrelationVolume};

/// Sum the correlation volumes of all particles, frame by frame.
pub fn sum_over_particles(correlations: &CorrelationSet) -> Vec<CorrelationVolume> {
    let Some(first) = correlations.first() else {
        return Vec::new();
    };

    let mut sums: Vec<CorrelationVolume> = first.clone();
    for frames in correlations.iter().skip(1) {
        for (sum, volume) in sums.iter_mut().zip(frames) {
            sum.add_assign(volume);
        }
    }
    sums
}

/// Sub-pixel correlation peak of every summed frame.
pub fn global_track(sums: &[CorrelationVolume]) -> Track {
    sums.iter().map(CorrelationVolume::peak_shift).collect()
}

/// Per-particle offset that best explains all frames once the global track
/// is applied, searched within `radius` pixels of the global track.
pub fn global_offsets(
    correlations: &CorrelationSet,
    global: &[Position],
    radius: f64,
) -> Vec<Position> {
    let r = radius.max(0.0).floor() as i64;
    let size = (2 * r + 1) as usize;

    correlations
        .par_iter()
        .map(|frames| {
            let mut map = Array2::<f64>::from_elem((size, size), f64::NEG_INFINITY);
            for dy in -r..=r {
                for dx in -r..=r {
                    if ((dx * dx + dy * dy) as f64).sqrt() > radius {
                        continue;
                    }
                    let offset = Position::new(dx as f64, dy as f64);
                    let score: f64 = frames
                        .iter()
                        .zip(global)
                        .map(|(volume, &g)| volume.sample(offset + g))
                        .sum();
                    map[[(dy + r) as usize, (dx + r) as usize]] = score;
                }
            }

            let mut best = (r as usize, r as usize, f64::NEG_INFINITY);
            for ((row, col), &v) in map.indexed_iter() {
                if v > best.2 {
                    best = (row, col, v);
                }
            }

            // Cells outside the search disc would poison the parabola fit.
            let finite = map.mapv(|v| if v.is_finite() { v } else { best.2 });
            let refined = refine_peak_paraboloid(&finite, best.0, best.1);
            Position::new(
                best.1 as f64 - r as f64 + refined.x,
                best.0 as f64 - r as f64 + refined.y,
            )
        })
        .collect()
}
