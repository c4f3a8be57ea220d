use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{DriftError, Result};
use crate::spectrum::{ifft2d, Spectrum};

use super::{CorrelationSet, CorrelationVolume};

/// Produces the correlation volume of one particle in one frame.
pub trait CorrelationBuilder: Sync {
    /// `weight` is the per-frame damage weight, same shape as the spectra.
    fn build(
        &self,
        observed: &Spectrum,
        predicted: &Spectrum,
        weight: &Array2<f64>,
    ) -> CorrelationVolume;
}

/// Cross-correlation through the Fourier domain, cropped to a square window
/// around the zero shift.
#[derive(Clone, Debug)]
pub struct FourierCorrelationBuilder {
    /// Edge length of the returned volume. `None` keeps the full box.
    pub window: Option<usize>,
}

impl CorrelationBuilder for FourierCorrelationBuilder {
    fn build(
        &self,
        observed: &Spectrum,
        predicted: &Spectrum,
        weight: &Array2<f64>,
    ) -> CorrelationVolume {
        let (h, w) = observed.dim();

        let mut product = observed.clone();
        product
            .iter_mut()
            .zip(predicted.iter())
            .zip(weight.iter())
            .for_each(|((o, p), &wgt)| *o = *o * p.conj() * wgt);

        let cc = ifft2d(&product);

        let size_y = self.window.unwrap_or(h).min(h);
        let size_x = self.window.unwrap_or(w).min(w);
        let (half_y, half_x) = (size_y / 2, size_x / 2);

        // Shift index i of the window maps to the wrapped lag (i - half).
        let data = Array2::from_shape_fn((size_y, size_x), |(row, col)| {
            let src_row = (row + h - half_y) % h;
            let src_col = (col + w - half_x) % w;
            cc[[src_row, src_col]]
        });

        CorrelationVolume::new(data)
    }
}

/// Build the correlation volumes of every particle and frame, in parallel
/// over particles.
pub fn build_correlation_set(
    builder: &dyn CorrelationBuilder,
    movie: &[Vec<Spectrum>],
    references: &[Spectrum],
    weights: &[Array2<f64>],
) -> Result<CorrelationSet> {
    if movie.len() != references.len() {
        return Err(DriftError::DimensionMismatch {
            expected: movie.len(),
            actual: references.len(),
        });
    }
    if let Some(frames) = movie.first() {
        if frames.len() != weights.len() {
            return Err(DriftError::DimensionMismatch {
                expected: frames.len(),
                actual: weights.len(),
            });
        }
    }

    Ok(movie
        .par_iter()
        .zip(references.par_iter())
        .map(|(frames, reference)| {
            frames
                .iter()
                .zip(weights)
                .map(|(frame, weight)| builder.build(frame, reference, weight))
                .collect()
        })
        .collect())
}
