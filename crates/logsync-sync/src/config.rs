//! Node configuration and application hooks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logsync_core::{Action, Meta, NodeId};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, HookResult, Result, SyncError};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u32 = 3;

/// Subprotocol assumed for peers that do not announce one.
pub const DEFAULT_SUBPROTOCOL: &str = "0.0.0";

/// Configuration for a sync node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Protocol version announced to the peer.
    pub protocol: u32,
    /// Lowest peer protocol version accepted.
    pub min_protocol: u32,
    /// Application subprotocol announced to the peer.
    pub subprotocol: Option<String>,
    /// Credentials sent in the handshake.
    pub token: Option<String>,
    /// Idle interval before sending `ping`. Requires `timeout`.
    pub ping: Option<Duration>,
    /// How long to wait for `connected`, `pong` and `synced`.
    pub timeout: Option<Duration>,
    /// Estimate the clock offset during the handshake. Client only; `None`
    /// means on for clients.
    pub fix_time: Option<bool>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            min_protocol: PROTOCOL_VERSION,
            subprotocol: None,
            token: None,
            ping: None,
            timeout: None,
            fix_time: None,
        }
    }
}

impl NodeConfig {
    pub fn with_protocol(mut self, protocol: u32) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_min_protocol(mut self, min_protocol: u32) -> Self {
        self.min_protocol = min_protocol;
        self
    }

    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_ping(mut self, ping: Duration) -> Self {
        self.ping = Some(ping);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fix_time(mut self, fix_time: bool) -> Self {
        self.fix_time = Some(fix_time);
        self
    }

    /// Reject option combinations that cannot work.
    pub fn validate(&self, server: bool) -> Result<()> {
        if self.ping.is_some() && self.timeout.is_none() {
            return Err(SyncError::Config(
                "ping requires a timeout to detect a lost connection".into(),
            ));
        }
        if server && self.fix_time == Some(true) {
            return Err(SyncError::Config(
                "fix_time is only supported on the client".into(),
            ));
        }
        Ok(())
    }
}

/// Peer credentials presented during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthRequest {
    pub node_id: NodeId,
    pub token: Option<String>,
    pub headers: Map<String, Value>,
}

/// Decides whether a peer may sync.
///
/// Return `Ok(false)` to reject with `wrong-credentials`, or
/// `Err(HookError::Protocol(..))` to reject with a specific kind such as
/// `bruteforce`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: AuthRequest) -> HookResult<bool>;
}

#[async_trait]
impl<F, Fut> Authenticator for F
where
    F: Fn(AuthRequest) -> Fut + Send + Sync,
    Fut: Future<Output = HookResult<bool>> + Send + 'static,
{
    async fn authenticate(&self, request: AuthRequest) -> HookResult<bool> {
        self(request).await
    }
}

/// Filters and transforms applied to synced actions.
///
/// `in_*` hooks run on received actions before they reach the log;
/// `out_*` hooks run on local actions before they are sent.
#[async_trait]
pub trait SyncHooks: Send + Sync {
    async fn in_filter(&self, _action: &Action, _meta: &Meta) -> HookResult<bool> {
        Ok(true)
    }

    async fn in_map(&self, action: Action, meta: Meta) -> HookResult<(Action, Meta)> {
        Ok((action, meta))
    }

    async fn out_filter(&self, _action: &Action, _meta: &Meta) -> HookResult<bool> {
        Ok(true)
    }

    async fn out_map(&self, action: Action, meta: Meta) -> HookResult<(Action, Meta)> {
        Ok((action, meta))
    }
}

/// What the node learned about its peer during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub node_id: NodeId,
    pub protocol: u32,
    pub subprotocol: String,
    pub headers: Map<String, Value>,
}

/// Application check run on the peer before authentication.
pub type ConnectCheck = Arc<dyn Fn(&PeerInfo) -> std::result::Result<(), ErrorKind> + Send + Sync>;

/// Application hooks for a node.
#[derive(Clone, Default)]
pub struct NodeHooks {
    pub auth: Option<Arc<dyn Authenticator>>,
    pub sync: Option<Arc<dyn SyncHooks>>,
    pub connect_check: Option<ConnectCheck>,
}

impl NodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth(mut self, auth: impl Authenticator + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    pub fn with_sync(mut self, hooks: impl SyncHooks + 'static) -> Self {
        self.sync = Some(Arc::new(hooks));
        self
    }

    /// Reject peers, e.g. with `wrong-subprotocol`, before authentication.
    pub fn with_connect_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&PeerInfo) -> std::result::Result<(), ErrorKind> + Send + Sync + 'static,
    {
        self.connect_check = Some(Arc::new(check));
        self
    }
}

impl std::fmt::Debug for NodeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHooks")
            .field("auth", &self.auth.is_some())
            .field("sync", &self.sync.is_some())
            .field("connect_check", &self.connect_check.is_some())
            .finish()
    }
}
