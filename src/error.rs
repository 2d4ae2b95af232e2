//! Error types for the spare-mlp crate

use thiserror::Error;

/// Result type alias for spare-mlp operations
pub type Result<T> = std::result::Result<T, SpareError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum SpareError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for SpareError {
    fn from(err: polars::error::PolarsError) -> Self {
        SpareError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for SpareError {
    fn from(err: serde_json::Error) -> Self {
        SpareError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SpareError {
    fn from(err: ndarray::ShapeError) -> Self {
        SpareError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
