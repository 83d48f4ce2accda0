//! Error types for nuchic

use thiserror::Error;

/// nuchic error type
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument is inconsistent with the map state.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A coordinate fell outside the half-open unit interval.
    #[error("coordinate {value} in dimension {dim} is outside [0, 1)")]
    OutOfRange {
        /// Dimension of the offending coordinate.
        dim: usize,
        /// The offending value.
        value: f64,
    },

    /// Serialized state could not be restored.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
