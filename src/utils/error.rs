//! Error types and handling
//!
//! Errors surfaced synchronously to callers of the recorder. Process
//! lifecycle failures never show up here; they end up in the persisted
//! recording instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Recording or stream not found: {0}")]
    NotFound(String),

    #[error("Recording already running: {0}")]
    AlreadyRunning(String),

    #[error("Recording not active: {0}")]
    NotActive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Error response for the route layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::NotFound(_) => "NOT_FOUND",
            RecorderError::AlreadyRunning(_) => "ALREADY_RUNNING",
            RecorderError::NotActive(_) => "NOT_ACTIVE",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Store(_) => "STORE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
