#![allow(dead_code)]

use beamdrift_core::correlation::CorrelationVolume;
use beamdrift_core::geometry::{Position, Track};
use beamdrift_core::motion::DifferentiableObjective;
use ndarray::Array2;

/// Square correlation volume holding a Gaussian bump centred on `peak`
/// (a shift in pixels relative to the volume origin).
pub fn gaussian_volume(size: usize, peak: Position, sigma: f64) -> CorrelationVolume {
    let origin = (size / 2) as f64;
    CorrelationVolume::new(Array2::from_shape_fn((size, size), |(row, col)| {
        let dx = col as f64 - origin - peak.x;
        let dy = row as f64 - origin - peak.y;
        (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    }))
}

/// One Gaussian volume per particle and frame, peaked on `tracks`.
pub fn volumes_for(tracks: &[Track], size: usize, sigma: f64) -> Vec<Vec<CorrelationVolume>> {
    tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|&peak| gaussian_volume(size, peak, sigma))
                .collect()
        })
        .collect()
}

/// Central finite-difference gradient of `objective` at `params`.
pub fn numeric_gradient<O: DifferentiableObjective>(objective: &O, params: &[f64], h: f64) -> Vec<f64> {
    let mut x = params.to_vec();
    (0..params.len())
        .map(|i| {
            let orig = x[i];
            x[i] = orig + h;
            let plus = objective.cost(&x);
            x[i] = orig - h;
            let minus = objective.cost(&x);
            x[i] = orig;
            (plus - minus) / (2.0 * h)
        })
        .collect()
}

/// Largest distance between matching positions of two track sets.
pub fn max_track_error(a: &[Track], b: &[Track]) -> f64 {
    a.iter()
        .zip(b)
        .flat_map(|(ta, tb)| ta.iter().zip(tb).map(|(pa, pb)| pa.distance(pb)))
        .fold(0.0, f64::max)
}

/// RMS distance between matching positions of two track sets.
pub fn rms_track_error(a: &[Track], b: &[Track]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (ta, tb) in a.iter().zip(b) {
        for (pa, pb) in ta.iter().zip(tb) {
            sum += pa.distance(pb).powi(2);
            n += 1;
        }
    }
    (sum / n.max(1) as f64).sqrt()
}
