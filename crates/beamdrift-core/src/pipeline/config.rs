use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_MAX_ITERS, DEFAULT_MAX_STEP, DEFAULT_MIN_DIFF, DEFAULT_MIN_STEP, DEFAULT_R_DIV,
    DEFAULT_R_VEL, DEFAULT_SEARCH_ITERS, DEFAULT_SIG_ACC, DEFAULT_SIG_DIV, DEFAULT_SIG_VEL,
    GLOBAL_OFFSET_RADIUS_FRACTION,
};
use crate::damage::DamageModel;
use crate::error::{DriftError, Result};
use crate::fsc::TscMode;
use crate::motion::descent::DescentParams;
use crate::motion::prior::{KernelShape, PriorSigmas};
use crate::search::Candidate;

/// What a run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Per-particle trajectories for every micrograph.
    EstimateMotion,
    /// Tuned `(sig_vel, sig_div)` hyperparameters.
    EstimateParams,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EstimateMotion => write!(f, "Motion"),
            Self::EstimateParams => write!(f, "Parameters"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionFitConfig {
    /// Frequency cutoff in pixels. Correlations only use frequencies below
    /// it; parameter estimation scores the frequencies above it.
    pub k_cutoff: Option<f64>,
    /// Edge length of the correlation volumes (default: full box).
    pub correlation_window: Option<usize>,
    /// Worker threads (0 = one per core).
    pub threads: usize,
    /// Micrographs with fewer particles are skipped during motion estimation.
    pub min_particles: usize,
    /// Write diagnostic tracks and correlation images.
    pub diagnostics: bool,
    pub dose: DoseConfig,
    pub prior: PriorConfig,
    pub optimizer: OptimizerConfig,
    pub init: InitConfig,
    pub search: SearchConfig,
}

impl Default for MotionFitConfig {
    fn default() -> Self {
        Self {
            k_cutoff: None,
            correlation_window: None,
            threads: 0,
            min_particles: 2,
            diagnostics: false,
            dose: DoseConfig::default(),
            prior: PriorConfig::default(),
            optimizer: OptimizerConfig::default(),
            init: InitConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

fn is_positive(value: f64) -> bool {
    value > 0.0
}

impl MotionFitConfig {
    /// Reject configurations that cannot run, before any work starts.
    pub fn validate(&self, mode: RunMode) -> Result<()> {
        if !is_positive(self.dose.angpix) {
            return Err(DriftError::InvalidConfig(format!(
                "pixel size must be positive, got {}",
                self.dose.angpix
            )));
        }
        if !is_positive(self.dose.dose_per_frame) {
            return Err(DriftError::InvalidConfig(format!(
                "dose per frame must be positive, got {}",
                self.dose.dose_per_frame
            )));
        }
        if !is_positive(self.optimizer.max_step) {
            return Err(DriftError::InvalidConfig(format!(
                "optimizer step must be positive, got {}",
                self.optimizer.max_step
            )));
        }
        if self.correlation_window == Some(0) {
            return Err(DriftError::InvalidConfig(
                "correlation window must not be empty".into(),
            ));
        }
        if mode == RunMode::EstimateParams {
            match self.k_cutoff {
                Some(k) if k > 0.0 => {}
                _ => {
                    return Err(DriftError::InvalidConfig(
                        "parameter estimation requires a frequency cutoff (k_cutoff)".into(),
                    ))
                }
            }
            if !(is_positive(self.search.r_vel) && is_positive(self.search.r_div)) {
                return Err(DriftError::InvalidConfig(
                    "parameter search steps (r_vel, r_div) must be positive".into(),
                ));
            }
            if self.search.max_iters == 0 {
                return Err(DriftError::InvalidConfig(
                    "parameter search needs at least one round (search.max_iters)".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DoseConfig {
    /// Electron dose per frame (e-/A^2).
    pub dose_per_frame: f64,
    /// Pixel size of the particle images (A).
    pub angpix: f64,
    /// Index of the first frame in the original movie.
    pub first_frame: usize,
    pub damage: DamageModel,
}

impl Default for DoseConfig {
    fn default() -> Self {
        Self {
            dose_per_frame: 1.0,
            angpix: 1.0,
            first_frame: 0,
            damage: DamageModel::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Velocity sigma (A/dose).
    pub sig_vel: f64,
    /// Divergence sigma (A).
    pub sig_div: f64,
    /// Acceleration sigma (A/dose); non-positive disables the term.
    pub sig_acc: f64,
    pub kernel: KernelShape,
    /// Particles further apart than this (pixels) are not coupled.
    pub max_divergence_distance: Option<f64>,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            sig_vel: DEFAULT_SIG_VEL,
            sig_div: DEFAULT_SIG_DIV,
            sig_acc: DEFAULT_SIG_ACC,
            kernel: KernelShape::default(),
            max_divergence_distance: None,
        }
    }
}

impl PriorConfig {
    /// Pixel-unit sigmas for the configured hyperparameters.
    pub fn sigmas(&self, dose: &DoseConfig) -> PriorSigmas {
        self.sigmas_for(
            Candidate {
                sig_vel: self.sig_vel,
                sig_div: self.sig_div,
            },
            dose,
        )
    }

    /// Pixel-unit sigmas with velocity and divergence taken from `candidate`.
    pub fn sigmas_for(&self, candidate: Candidate, dose: &DoseConfig) -> PriorSigmas {
        PriorSigmas::from_physical(
            candidate.sig_vel,
            self.sig_acc,
            candidate.sig_div,
            dose.dose_per_frame,
            dose.angpix,
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iters: usize,
    /// Initial step size.
    pub max_step: f64,
    pub min_step: f64,
    pub min_diff: f64,
    pub inertia: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_MAX_ITERS,
            max_step: DEFAULT_MAX_STEP,
            min_step: DEFAULT_MIN_STEP,
            min_diff: DEFAULT_MIN_DIFF,
            inertia: 0.0,
        }
    }
}

impl OptimizerConfig {
    pub fn descent_params(&self) -> DescentParams {
        DescentParams {
            step: self.max_step,
            min_step: self.min_step,
            min_diff: self.min_diff,
            max_iters: self.max_iters,
            inertia: self.inertia,
        }
    }
}

/// Where the initial trajectories come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialTrackSource {
    /// Global track from the summed correlations plus per-particle offsets.
    #[default]
    Global,
    /// Per-frame shifts persisted with the micrograph.
    Metadata,
}

impl std::fmt::Display for InitialTrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "Global"),
            Self::Metadata => write!(f, "Metadata"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub source: InitialTrackSource,
    /// Keep the global motion out of the prior.
    pub unregularized_global: bool,
    /// Estimate static per-particle offsets from the global track.
    pub global_offsets: bool,
    /// Offset search radius as a fraction of the box size.
    pub offset_radius_fraction: f64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            source: InitialTrackSource::default(),
            unregularized_global: false,
            global_offsets: true,
            offset_radius_fraction: GLOBAL_OFFSET_RADIUS_FRACTION,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Velocity step as a fraction of `sig_vel`.
    pub r_vel: f64,
    /// Divergence step as a fraction of `sig_div`.
    pub r_div: f64,
    /// Maximum number of evaluation rounds.
    pub max_iters: usize,
    pub tsc_mode: TscMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            r_vel: DEFAULT_R_VEL,
            r_div: DEFAULT_R_DIV,
            max_iters: DEFAULT_SEARCH_ITERS,
            tsc_mode: TscMode::default(),
        }
    }
}
