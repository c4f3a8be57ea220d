pub mod descent;
pub mod objective;
pub mod prior;

use tracing::debug;

use crate::correlation::CorrelationVolume;
use crate::error::{DriftError, Result};
use crate::geometry::{Position, Track};

use descent::{optimize, DescentOutcome, DescentParams};
use objective::{params_to_tracks, tracks_to_params, TrajectoryObjective};
use prior::{KernelShape, PriorSigmas, PriorWeights};

pub use descent::{DifferentiableObjective, StopReason};

/// Everything needed to turn correlation evidence into trajectories for one
/// choice of hyperparameters.
#[derive(Clone, Debug)]
pub struct TrackSolver {
    pub sigmas: PriorSigmas,
    pub kernel: KernelShape,
    pub max_divergence_distance: Option<f64>,
    pub descent: DescentParams,
}

/// Optimized tracks plus the descent report (absent when nothing was solved).
#[derive(Clone, Debug)]
pub struct TrackSolution {
    pub tracks: Vec<Track>,
    pub outcome: Option<DescentOutcome>,
}

impl TrackSolver {
    /// Optimize every particle's track starting from `initial`.
    ///
    /// `positions` are the particle coordinates on the micrograph and
    /// `global` the per-frame drift added to every lookup.
    pub fn solve(
        &self,
        correlations: &[Vec<CorrelationVolume>],
        initial: &[Track],
        positions: &[Position],
        global: &[Position],
    ) -> Result<TrackSolution> {
        let pc = initial.len();
        if pc == 0 {
            return Ok(TrackSolution {
                tracks: Vec::new(),
                outcome: None,
            });
        }

        let fc = initial[0].len();
        if let Some(bad) = initial.iter().find(|t| t.len() != fc) {
            return Err(DriftError::DimensionMismatch {
                expected: fc,
                actual: bad.len(),
            });
        }
        if positions.len() != pc {
            return Err(DriftError::DimensionMismatch {
                expected: pc,
                actual: positions.len(),
            });
        }
        if correlations.len() != pc {
            return Err(DriftError::DimensionMismatch {
                expected: pc,
                actual: correlations.len(),
            });
        }

        let weights = PriorWeights::new(
            self.sigmas,
            positions,
            fc,
            self.kernel,
            self.max_divergence_distance,
        );
        let objective = TrajectoryObjective::new(correlations, weights, global)?;

        let outcome = optimize(tracks_to_params(initial), &objective, &self.descent);
        if !outcome.converged() {
            debug!(
                iterations = outcome.iterations,
                "Track optimization stopped at the iteration limit"
            );
        }

        Ok(TrackSolution {
            tracks: params_to_tracks(&outcome.params, pc, fc),
            outcome: Some(outcome),
        })
    }
}
