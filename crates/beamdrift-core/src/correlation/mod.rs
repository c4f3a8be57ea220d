mod builder;
pub mod global;
pub mod subpixel;
mod volume;

pub use builder::{build_correlation_set, CorrelationBuilder, FourierCorrelationBuilder};
pub use volume::CorrelationVolume;

/// Correlation volumes indexed `[particle][frame]`.
pub type CorrelationSet = Vec<Vec<CorrelationVolume>>;
