use std::f64::consts::TAU;

use ndarray::Array2;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::geometry::Position;

/// Full complex 2-D spectrum in FFT order (DC at `[0, 0]`).
pub type Spectrum = Array2<Complex<f64>>;

/// Signed frequency of FFT bin `index` along an axis of length `n`.
pub fn signed_frequency(index: usize, n: usize) -> f64 {
    if index > n / 2 {
        index as f64 - n as f64
    } else {
        index as f64
    }
}

/// Forward 2-D FFT of a real image.
pub fn fft2d(data: &Array2<f64>) -> Spectrum {
    let mut work = data.mapv(|v| Complex::new(v, 0.0));
    let mut planner = FftPlanner::new();
    let (h, w) = work.dim();
    transform_rows(&mut work, planner.plan_fft_forward(w).as_ref());
    transform_cols(&mut work, planner.plan_fft_forward(h).as_ref());
    work
}

/// Inverse 2-D FFT, keeping the normalized real part.
pub fn ifft2d(spectrum: &Spectrum) -> Array2<f64> {
    let mut work = spectrum.clone();
    let mut planner = FftPlanner::new();
    let (h, w) = work.dim();
    transform_cols(&mut work, planner.plan_fft_inverse(h).as_ref());
    transform_rows(&mut work, planner.plan_fft_inverse(w).as_ref());

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|c| c.re * scale)
}

fn transform_rows(work: &mut Spectrum, fft: &dyn Fft<f64>) {
    for mut row in work.rows_mut() {
        let mut line: Vec<Complex<f64>> = row.to_vec();
        fft.process(&mut line);
        row.iter_mut().zip(line).for_each(|(dst, src)| *dst = src);
    }
}

fn transform_cols(work: &mut Spectrum, fft: &dyn Fft<f64>) {
    for mut col in work.columns_mut() {
        let mut line: Vec<Complex<f64>> = col.to_vec();
        fft.process(&mut line);
        col.iter_mut().zip(line).for_each(|(dst, src)| *dst = src);
    }
}

/// Translate the image behind `spectrum` by `shift` pixels (phase ramp).
///
/// An image `g(r) = f(r - t)` has the spectrum `F(k) * exp(-2 pi i k.t / n)`.
pub fn shift_spectrum(spectrum: &Spectrum, shift: Position) -> Spectrum {
    let (h, w) = spectrum.dim();
    let mut out = spectrum.clone();

    for ((row, col), value) in out.indexed_iter_mut() {
        let ky = signed_frequency(row, h);
        let kx = signed_frequency(col, w);
        let phase = -TAU * (kx * shift.x / w as f64 + ky * shift.y / h as f64);
        *value *= Complex::from_polar(1.0, phase);
    }

    out
}
