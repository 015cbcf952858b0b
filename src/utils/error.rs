//! Error Handling Module
//!
//! Defines the error type shared by the cross-validation trainer.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for cross-validation runs
#[derive(Error, Debug)]
pub enum CrossValError {
    /// Configuration error detected before training starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// A declared class folder produced no samples
    #[error("Class '{class}' has no samples under '{prefix}'")]
    EmptyClass { class: String, prefix: String },

    /// A class is too small to appear in every validation fold
    #[error("Class '{class}' has {count} samples, fewer than the {folds} requested folds")]
    InsufficientSamples {
        class: String,
        count: usize,
        folds: usize,
    },

    /// Blob could not be listed or read
    #[error("Blob error at '{path}': {message}")]
    Blob { path: String, message: String },

    /// Blob content is not a decodable image
    #[error("Failed to decode image at '{path}': {message}")]
    Decode { path: String, message: String },

    /// Loss diverged during a training or evaluation pass
    #[error("Non-finite loss {value} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss {
        epoch: usize,
        batch: usize,
        value: f64,
    },

    /// Error with model construction or weights
    #[error("Model error: {0}")]
    Model(String),

    /// Error reading or writing a parameter record
    #[error("Record error: {0}")]
    Record(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Aggregation was asked to reduce zero folds
    #[error("No fold results to aggregate")]
    EmptyFolds,
}

impl CrossValError {
    /// Errors that are raised before any training step runs
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            CrossValError::Config(_)
                | CrossValError::EmptyClass { .. }
                | CrossValError::InsufficientSamples { .. }
        )
    }
}

impl From<serde_json::Error> for CrossValError {
    fn from(err: serde_json::Error) -> Self {
        CrossValError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CrossValError {
    fn from(err: toml::de::Error) -> Self {
        CrossValError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CrossValError {
    fn from(err: toml::ser::Error) -> Self {
        CrossValError::Serialization(err.to_string())
    }
}

/// Convenience Result type for cross-validation operations
pub type Result<T> = std::result::Result<T, CrossValError>;
