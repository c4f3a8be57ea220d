use ndarray::Array2;
use num_complex::Complex;
use num_traits::Zero;
use rayon::prelude::*;

use super::fft::{signed_frequency, Spectrum};

/// Number of frequency shells for a square box of `box_size` pixels.
pub fn shell_count(box_size: usize) -> usize {
    box_size / 2 + 1
}

/// Radial frequency shell of an FFT-ordered pixel, rounded to the nearest integer.
pub fn shell_index(row: usize, col: usize, height: usize, width: usize) -> usize {
    let ky = signed_frequency(row, height);
    let kx = signed_frequency(col, width);
    (kx * kx + ky * ky).sqrt().round() as usize
}

/// Radial frequency (in pixels) of every bin of an `(h, w)` spectrum.
pub fn radius_map(height: usize, width: usize) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(row, col)| {
        let ky = signed_frequency(row, height);
        let kx = signed_frequency(col, width);
        (kx * kx + ky * ky).sqrt()
    })
}

/// Mean power per shell over every particle and frame of a movie.
pub fn power_spectrum(movie: &[Vec<Spectrum>], shells: usize) -> Vec<f64> {
    let mut sum = vec![0.0f64; shells];
    let mut count = vec![0usize; shells];

    for frame in movie.iter().flatten() {
        let (h, w) = frame.dim();
        for ((row, col), value) in frame.indexed_iter() {
            let k = shell_index(row, col, h, w);
            if k < shells {
                sum[k] += value.norm_sqr();
                count[k] += 1;
            }
        }
    }

    sum.iter()
        .zip(&count)
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { 0.0 })
        .collect()
}

/// Whiten every frame by the per-shell noise power. Bins in shells without
/// power (or beyond the last shell) are zeroed.
pub fn normalize_movie(movie: &mut [Vec<Spectrum>], sigma2: &[f64]) {
    movie.par_iter_mut().for_each(|frames| {
        for frame in frames.iter_mut() {
            let (h, w) = frame.dim();
            for ((row, col), value) in frame.indexed_iter_mut() {
                let k = shell_index(row, col, h, w);
                match sigma2.get(k) {
                    Some(&s2) if s2 > 0.0 => *value /= s2.sqrt(),
                    _ => *value = Complex::zero(),
                }
            }
        }
    });
}
