//! Error types for the sync module.
//!
//! [`ErrorKind`] is the wire taxonomy carried by `error` messages.
//! [`SyncError`] is what the node raises on its error channel.

use logsync_log::{LogError, StoreError};
use serde_json::{json, Value};
use thiserror::Error;

/// Protocol error kinds, as sent in `["error", name, options?]`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// A request was not answered in time.
    #[error("a timeout was reached ({ms} ms)")]
    Timeout { ms: u64 },

    /// A message failed structural validation. Carries the raw message.
    #[error("wrong message format in {0}")]
    WrongFormat(String),

    /// A message tag this node does not know.
    #[error("unknown message `{0}` type")]
    UnknownMessage(String),

    #[error("too many wrong login attempts")]
    Bruteforce,

    #[error("only protocol versions from {supported} are supported, but {used} was used")]
    WrongProtocol { supported: u32, used: u32 },

    #[error("only {supported} application subprotocols are supported, but {used} was used")]
    WrongSubprotocol { supported: String, used: String },

    #[error("wrong credentials")]
    WrongCredentials,

    /// An error name outside the known set, kept verbatim.
    #[error("peer error `{name}`")]
    Other { name: String, options: Option<Value> },
}

impl ErrorKind {
    /// Wire name of the kind.
    pub fn name(&self) -> &str {
        match self {
            ErrorKind::Timeout { .. } => "timeout",
            ErrorKind::WrongFormat(_) => "wrong-format",
            ErrorKind::UnknownMessage(_) => "unknown-message",
            ErrorKind::Bruteforce => "bruteforce",
            ErrorKind::WrongProtocol { .. } => "wrong-protocol",
            ErrorKind::WrongSubprotocol { .. } => "wrong-subprotocol",
            ErrorKind::WrongCredentials => "wrong-credentials",
            ErrorKind::Other { name, .. } => name,
        }
    }

    /// Wire options of the kind, if it has any.
    pub fn options(&self) -> Option<Value> {
        match self {
            ErrorKind::Timeout { ms } => Some(json!(ms)),
            ErrorKind::WrongFormat(raw) => Some(json!(raw)),
            ErrorKind::UnknownMessage(name) => Some(json!(name)),
            ErrorKind::WrongProtocol { supported, used } => {
                Some(json!({ "supported": supported, "used": used }))
            }
            ErrorKind::WrongSubprotocol { supported, used } => {
                Some(json!({ "supported": supported, "used": used }))
            }
            ErrorKind::Bruteforce | ErrorKind::WrongCredentials => None,
            ErrorKind::Other { options, .. } => options.clone(),
        }
    }

    /// Rebuild a kind from a received name and options.
    ///
    /// Known names whose options have an unexpected shape are kept as
    /// [`ErrorKind::Other`].
    pub fn from_wire(name: &str, options: Option<&Value>) -> Self {
        let parsed = match name {
            "timeout" => options
                .and_then(Value::as_u64)
                .map(|ms| ErrorKind::Timeout { ms }),
            "wrong-format" => options
                .and_then(Value::as_str)
                .map(|raw| ErrorKind::WrongFormat(raw.to_string())),
            "unknown-message" => options
                .and_then(Value::as_str)
                .map(|tag| ErrorKind::UnknownMessage(tag.to_string())),
            "bruteforce" => Some(ErrorKind::Bruteforce),
            "wrong-credentials" => Some(ErrorKind::WrongCredentials),
            "wrong-protocol" => options.and_then(Value::as_object).and_then(|o| {
                Some(ErrorKind::WrongProtocol {
                    supported: u32::try_from(o.get("supported")?.as_u64()?).ok()?,
                    used: u32::try_from(o.get("used")?.as_u64()?).ok()?,
                })
            }),
            "wrong-subprotocol" => options.and_then(Value::as_object).and_then(|o| {
                Some(ErrorKind::WrongSubprotocol {
                    supported: o.get("supported")?.as_str()?.to_string(),
                    used: o.get("used")?.as_str()?.to_string(),
                })
            }),
            _ => None,
        };
        parsed.unwrap_or_else(|| ErrorKind::Other {
            name: name.to_string(),
            options: options.cloned(),
        })
    }

    /// Fatal kinds end the session; `timeout` and version mismatches do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Timeout { .. }
                | ErrorKind::WrongProtocol { .. }
                | ErrorKind::WrongSubprotocol { .. }
        )
    }
}

/// Errors returned by authentication and sync hooks.
#[derive(Debug, Error)]
pub enum HookError {
    /// A protocol rejection. Authentication forwards it to the peer.
    #[error(transparent)]
    Protocol(#[from] ErrorKind),

    /// Anything else. Surfaced locally only.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HookError::Other(err.into())
    }
}

/// Result type for hooks.
pub type HookResult<T> = std::result::Result<T, HookError>;

/// Errors raised by a sync node.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Locally detected protocol error.
    #[error("{0}")]
    Protocol(ErrorKind),

    /// Error received from the peer.
    #[error("peer error: {0}")]
    Remote(ErrorKind),

    /// Log or store operation failed.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// A hook failed with something other than a protocol error.
    #[error("hook error: {0}")]
    Hook(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Transport-level error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Invalid node configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A message could not be serialized or parsed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The node was destroyed.
    #[error("node destroyed")]
    Destroyed,
}

impl SyncError {
    /// Whether this error is rethrown when nobody listens for errors.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Protocol(kind) | SyncError::Remote(kind) => kind.is_fatal(),
            SyncError::Destroyed => false,
            _ => true,
        }
    }

    /// The protocol kind, for local and received protocol errors.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            SyncError::Protocol(kind) | SyncError::Remote(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<HookError> for SyncError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Protocol(kind) => SyncError::Protocol(kind),
            HookError::Other(err) => SyncError::Hook(err),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Log(LogError::Store(err))
    }
}

impl From<logsync_core::CoreError> for SyncError {
    fn from(err: logsync_core::CoreError) -> Self {
        SyncError::Log(LogError::Core(err))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
