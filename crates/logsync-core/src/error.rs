//! Error types for logsync core.

use thiserror::Error;

/// Errors raised while building or mutating actions and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("expected \"type\" string in action")]
    MissingType,

    #[error("invalid action id: {0}")]
    InvalidId(String),

    #[error("meta \"{0}\" is read-only")]
    ReadOnlyField(String),

    #[error("invalid meta field \"{field}\": {reason}")]
    InvalidField { field: String, reason: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
