//! Shared utilities

pub mod error;

pub use error::{ErrorResponse, RecorderError, RecorderResult, StoreError};
