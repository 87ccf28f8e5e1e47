//! Error types for the store and the log.

use logsync_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failure inside a store backend.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A meta change could not be applied.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Invalid action or meta.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for log operations.
pub type LogResult<T> = std::result::Result<T, LogError>;
