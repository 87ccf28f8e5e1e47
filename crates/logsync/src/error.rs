//! Error types for logsync.

use logsync_core::CoreError;
use logsync_log::{LogError, StoreError};
use logsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur anywhere in logsync.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid action, id or meta change.
    #[error("invalid input: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Log error.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for logsync operations.
pub type Result<T> = std::result::Result<T, Error>;
