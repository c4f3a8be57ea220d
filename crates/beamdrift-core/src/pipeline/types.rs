use crate::correlation::CorrelationVolume;
use crate::error::Result;
use crate::fsc::FscTable;
use crate::geometry::{Position, Track};

/// Per-micrograph processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStage {
    Loading,
    NoiseNormalization,
    Correlation,
    Initialization,
    Optimization,
    Scoring,
    Writing,
}

impl std::fmt::Display for FitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading micrograph"),
            Self::NoiseNormalization => write!(f, "Normalizing noise"),
            Self::Correlation => write!(f, "Computing correlations"),
            Self::Initialization => write!(f, "Initializing tracks"),
            Self::Optimization => write!(f, "Optimizing tracks"),
            Self::Scoring => write!(f, "Scoring"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for motion estimation.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// Work on micrograph `index` (of `total`) has started.
    fn begin_micrograph(&self, _index: usize, _total: usize) {}

    /// A stage of the current micrograph has started.
    fn begin_stage(&self, _stage: FitStage) {}

    /// The current micrograph is finished, processed or skipped.
    fn finish_micrograph(&self, _outcome: &MicrographOutcome) {}
}

/// No-op progress reporter, used when no reporter is attached.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// What happened to one micrograph.
#[derive(Clone, Debug, PartialEq)]
pub enum MicrographOutcome {
    Processed {
        index: usize,
        particles: usize,
        iterations: usize,
    },
    Skipped {
        index: usize,
        reason: String,
    },
}

impl MicrographOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Processed { index, .. } | Self::Skipped { index, .. } => *index,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

/// Estimated motion of one micrograph, handed to a [`MotionSink`].
#[derive(Clone, Debug)]
pub struct MicrographMotion {
    pub index: usize,
    pub name: String,
    pub positions: Vec<Position>,
    /// Per-particle tracks, excluding `global_component`.
    pub tracks: Vec<Track>,
    /// Motion shared by all particles; zero unless the global track is kept
    /// out of the prior.
    pub global_component: Track,
    /// Per-frame FSC of the motion-corrected particles.
    pub fsc: FscTable,
    /// Particle-summed correlation volumes, when diagnostics are enabled.
    pub correlation_sums: Option<Vec<CorrelationVolume>>,
    pub iterations: usize,
}

impl MicrographMotion {
    /// Total shift of every particle in every frame.
    pub fn total_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .map(|track| {
                track
                    .iter()
                    .zip(&self.global_component)
                    .map(|(&t, &g)| t + g)
                    .collect()
            })
            .collect()
    }
}

/// Receives per-micrograph results as they are produced.
pub trait MotionSink {
    fn write(&mut self, motion: &MicrographMotion) -> Result<()>;
}

impl MotionSink for Vec<MicrographMotion> {
    fn write(&mut self, motion: &MicrographMotion) -> Result<()> {
        self.push(motion.clone());
        Ok(())
    }
}

/// Outcome of a full motion-estimation run.
#[derive(Clone, Debug, Default)]
pub struct MotionSummary {
    pub outcomes: Vec<MicrographOutcome>,
}

impl MotionSummary {
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_processed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.processed()
    }

    pub fn particles(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                MicrographOutcome::Processed { particles, .. } => *particles,
                MicrographOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}
