//! Error types for the visitor gender pipelines

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, GenderError>;

/// Main error type for the crate
///
/// Only infrastructure failures end up here. Feature-level problems
/// (malformed agents, bad timestamps, missing join matches) are absorbed
/// with sentinel values and never become a `GenderError`.
#[derive(Error, Debug)]
pub enum GenderError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Column not found: {0}")]
    FeatureNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid model file: {0}")]
    ModelFormatError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for GenderError {
    fn from(err: polars::error::PolarsError) -> Self {
        GenderError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for GenderError {
    fn from(err: serde_json::Error) -> Self {
        GenderError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for GenderError {
    fn from(err: bincode::Error) -> Self {
        GenderError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for GenderError {
    fn from(err: ndarray::ShapeError) -> Self {
        GenderError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
