use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Micrograph #{index} unavailable: {reason}")]
    InputUnavailable { index: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid MRC file: {0}")]
    InvalidMrc(String),

    #[error("Invalid track file: {0}")]
    InvalidTrackFile(String),

    #[error("Empty sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, DriftError>;
