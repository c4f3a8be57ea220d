//! Frequency- and dose-dependent attenuation from radiation damage.

use std::f64::consts::PI;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{DAMAGE_A, DAMAGE_B, DAMAGE_C};
use crate::spectrum::shells::radius_map;

/// Critical dose model `N_e(k) = a * k^b + c`, with `k` in 1/A and the dose
/// in e-/A^2.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for DamageModel {
    fn default() -> Self {
        Self {
            a: DAMAGE_A,
            b: DAMAGE_B,
            c: DAMAGE_C,
        }
    }
}

impl DamageModel {
    pub fn critical_dose(&self, k_angstrom: f64) -> f64 {
        self.a * k_angstrom.powf(self.b) + self.c
    }

    /// Fraction of signal surviving `dose` at spatial frequency `k_angstrom`.
    pub fn weight(&self, k_angstrom: f64, dose: f64) -> f64 {
        let ne = self.critical_dose(k_angstrom);
        if ne.is_nan() || ne <= 0.0 {
            0.0
        } else {
            (-0.5 * dose / ne).exp()
        }
    }
}

/// Damage weights for every frame of a movie, as FFT-ordered
/// `(box_size, box_size)` arrays.
///
/// Frame `f` has received `dose_per_frame * (first_frame + f + 1)`.
pub fn damage_weights(
    box_size: usize,
    angpix: f64,
    first_frame: usize,
    frame_count: usize,
    dose_per_frame: f64,
    model: &DamageModel,
) -> Vec<Array2<f64>> {
    let radius = radius_map(box_size, box_size);
    let box_angstrom = box_size as f64 * angpix;

    (0..frame_count)
        .map(|f| {
            let dose = dose_per_frame * (first_frame + f + 1) as f64;
            radius.mapv(|r| model.weight(r / box_angstrom, dose))
        })
        .collect()
}

/// Multiply every weight map by a raised-cosine low-pass envelope that is 1
/// below `k_cutoff - 1` pixels and 0 above `k_cutoff + 1`.
pub fn apply_frequency_cutoff(weights: &mut [Array2<f64>], k_cutoff: f64) {
    let (k0, k1) = (k_cutoff - 1.0, k_cutoff + 1.0);
    for weight in weights.iter_mut() {
        let (h, w) = weight.dim();
        let radius = radius_map(h, w);
        weight.zip_mut_with(&radius, |value, &r| {
            *value *= if r <= k0 {
                1.0
            } else if r >= k1 {
                0.0
            } else {
                0.5 * (1.0 + (PI * (r - k0) / (k1 - k0)).cos())
            };
        });
    }
}
