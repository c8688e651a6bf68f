//! Error types for Echocycle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid step number: {0} (steps are 1-based)")]
    InvalidStepNumber(u64),

    #[error("unknown stream: {0}")]
    UnknownStream(u8),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("stage failed: {stage} - {message}")]
    StageFailed { stage: String, message: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}
