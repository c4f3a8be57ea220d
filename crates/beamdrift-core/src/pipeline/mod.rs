pub mod config;
mod initial;
mod micrograph;
mod orchestrator;
mod types;

pub use config::{MotionFitConfig, RunMode};
pub use initial::{initial_motion, InitialMotion};
pub use micrograph::{MetadataShifts, Micrograph, MicrographSource};
pub use orchestrator::{MotionEstimator, PreparedMicrograph};
pub use types::{
    FitStage, MicrographMotion, MicrographOutcome, MotionSink, MotionSummary, NoOpReporter,
    ProgressReporter,
};
