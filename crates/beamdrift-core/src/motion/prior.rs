//! Gaussian-process style smoothness prior over particle trajectories.
//!
//! Three weight kernels couple positions that should move alike:
//! frames that are close in time (velocity), consecutive second differences
//! (acceleration) and particles that are close on the micrograph
//! (divergence).

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::SIGMA_FLOOR;
use crate::geometry::{Position, Track};

/// Shape of the covariance kernel, fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelShape {
    #[default]
    SquaredExponential,
    Exponential,
}

impl std::fmt::Display for KernelShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SquaredExponential => write!(f, "Squared Exponential"),
            Self::Exponential => write!(f, "Exponential"),
        }
    }
}

impl KernelShape {
    /// Kernel value at normalized distance `r >= 0`.
    pub fn eval(self, r: f64) -> f64 {
        match self {
            Self::SquaredExponential => (-0.5 * r * r).exp(),
            Self::Exponential => (-r).exp(),
        }
    }
}

/// Prior sigmas in pixel units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorSigmas {
    pub velocity: f64,
    pub acceleration: f64,
    pub divergence: f64,
}

impl PriorSigmas {
    /// Convert sigmas given per unit dose (velocity, acceleration) and in
    /// Angstrom (divergence) into pixel units.
    pub fn from_physical(
        sig_vel: f64,
        sig_acc: f64,
        sig_div: f64,
        dose_per_frame: f64,
        angpix: f64,
    ) -> Self {
        let scale = dose_per_frame / angpix;
        Self {
            velocity: scale * sig_vel,
            acceleration: scale * sig_acc,
            divergence: scale * sig_div,
        }
    }

    /// Clamp the velocity and divergence sigmas to [`SIGMA_FLOOR`].
    pub fn clamped(self) -> Self {
        let mut out = self;
        if out.velocity.is_nan() || out.velocity < SIGMA_FLOOR {
            warn!(
                sig_vel = out.velocity,
                floor = SIGMA_FLOOR,
                "Velocity sigma below floor, clamping"
            );
            out.velocity = SIGMA_FLOOR;
        }
        if out.divergence.is_nan() || out.divergence < SIGMA_FLOOR {
            warn!(
                sig_div = out.divergence,
                floor = SIGMA_FLOOR,
                "Divergence sigma below floor, clamping"
            );
            out.divergence = SIGMA_FLOOR;
        }
        out
    }

    pub fn acceleration_enabled(&self) -> bool {
        self.acceleration > 0.0
    }
}

/// Weight kernels of the smoothness prior for one micrograph and one set of
/// hyperparameters.
#[derive(Clone, Debug)]
pub struct PriorWeights {
    velocity: Array2<f64>,
    acceleration: f64,
    divergence: Array2<f64>,
}

impl PriorWeights {
    pub fn new(
        sigmas: PriorSigmas,
        positions: &[Position],
        frame_count: usize,
        kernel: KernelShape,
        max_divergence_distance: Option<f64>,
    ) -> Self {
        let sigmas = sigmas.clamped();

        let velocity = Array2::from_shape_fn((frame_count, frame_count), |(f, g)| {
            if f == g {
                0.0
            } else {
                let dt = f.abs_diff(g) as f64;
                0.5 * kernel.eval(dt / sigmas.velocity)
            }
        });

        let acceleration = if sigmas.acceleration_enabled() {
            0.5 * kernel.eval(1.0 / sigmas.acceleration)
        } else {
            0.0
        };

        let pc = positions.len();
        let divergence = Array2::from_shape_fn((pc, pc), |(p, q)| {
            if p == q {
                return 0.0;
            }
            let dist = positions[p].distance(&positions[q]);
            match max_divergence_distance {
                Some(max) if dist > max => 0.0,
                _ => 0.5 * kernel.eval(dist / sigmas.divergence),
            }
        });

        Self {
            velocity,
            acceleration,
            divergence,
        }
    }

    /// Symmetric `(fc, fc)` frame-pair weights.
    pub fn velocity(&self) -> &Array2<f64> {
        &self.velocity
    }

    /// Weight of every second difference; zero when disabled.
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Symmetric `(pc, pc)` particle-pair weights.
    pub fn divergence(&self) -> &Array2<f64> {
        &self.divergence
    }

    pub fn frame_count(&self) -> usize {
        self.velocity.nrows()
    }

    pub fn particle_count(&self) -> usize {
        self.divergence.nrows()
    }

    /// Velocity and acceleration penalty of a single track.
    pub fn track_cost(&self, track: &[Position]) -> f64 {
        let fc = track.len();
        let mut cost = 0.0;
        for f in 0..fc {
            for g in f + 1..fc {
                let w = self.velocity[[f, g]];
                if w > 0.0 {
                    cost += w * (track[f] - track[g]).norm_sq();
                }
            }
        }
        if self.acceleration > 0.0 {
            for f in 1..fc.saturating_sub(1) {
                let a = track[f + 1] - track[f] * 2.0 + track[f - 1];
                cost += self.acceleration * a.norm_sq();
            }
        }
        cost
    }

    /// Add the gradient of [`Self::track_cost`] to `grad`.
    pub fn add_track_gradient(&self, track: &[Position], grad: &mut [Position]) {
        let fc = track.len();
        for f in 0..fc {
            for g in f + 1..fc {
                let w = self.velocity[[f, g]];
                if w > 0.0 {
                    let d = (track[f] - track[g]) * (2.0 * w);
                    grad[f] += d;
                    grad[g] -= d;
                }
            }
        }
        if self.acceleration > 0.0 {
            for f in 1..fc.saturating_sub(1) {
                let a = (track[f + 1] - track[f] * 2.0 + track[f - 1]) * (2.0 * self.acceleration);
                grad[f + 1] += a;
                grad[f] -= a * 2.0;
                grad[f - 1] += a;
            }
        }
    }

    /// Divergence penalty over the frame deltas of all tracks.
    pub fn divergence_cost(&self, tracks: &[Track]) -> f64 {
        let mut cost = 0.0;
        self.for_each_divergence_term(tracks, |_, _, _, w, diff| {
            cost += w * diff.norm_sq();
        });
        cost
    }

    /// Gradient of [`Self::divergence_cost`] with respect to the frame deltas,
    /// indexed `[particle][step]`.
    pub fn divergence_gradient(&self, tracks: &[Track]) -> Vec<Vec<Position>> {
        let steps = tracks.first().map_or(0, |t| t.len().saturating_sub(1));
        let mut grad = vec![vec![Position::ZERO; steps]; tracks.len()];
        self.for_each_divergence_term(tracks, |p, q, k, w, diff| {
            let d = diff * (2.0 * w);
            grad[p][k] += d;
            grad[q][k] -= d;
        });
        grad
    }

    /// Visit `(p, q, step, weight, delta_p - delta_q)` for every coupled
    /// particle pair `p < q`.
    fn for_each_divergence_term<F>(&self, tracks: &[Track], mut visit: F)
    where
        F: FnMut(usize, usize, usize, f64, Position),
    {
        let pc = tracks.len();
        for p in 0..pc {
            for q in p + 1..pc {
                let w = self.divergence[[p, q]];
                if w <= 0.0 {
                    continue;
                }
                for k in 0..tracks[p].len().saturating_sub(1) {
                    let dp = tracks[p][k + 1] - tracks[p][k];
                    let dq = tracks[q][k + 1] - tracks[q][k];
                    visit(p, q, k, w, dp - dq);
                }
            }
        }
    }
}
