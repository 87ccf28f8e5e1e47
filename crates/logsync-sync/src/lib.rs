//! # logsync sync
//!
//! Peer-to-peer protocol that keeps two action logs converged over a
//! single bidirectional connection.
//!
//! ## Overview
//!
//! A [`Node`] wraps one [`Connection`] and one [`Log`](logsync_log::Log).
//! After a `connect`/`connected` handshake each side sends every action the
//! other has not yet acknowledged, then streams new additions as they
//! happen. Acknowledgements (`synced`) are persisted through the log store
//! so a reconnect resumes where the last session stopped.
//!
//! ## Message Flow
//!
//! ```text
//! Client                              Server
//!   |-------- connect ---------------->|
//!   |<------- connected ---------------|
//!   |<------- sync --------------------|
//!   |-------- synced ----------------->|
//!   |-------- sync ------------------->|
//!   |<------- synced ------------------|
//!   |-------- ping ------------------->|
//!   |<------- pong --------------------|
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use logsync_core::NodeId;
//! use logsync_log::{Log, MemoryStore};
//! use logsync_sync::{MemoryPair, Node, NodeConfig, NodeHooks, NodeState};
//!
//! async fn example() -> logsync_sync::Result<()> {
//!     let pair = MemoryPair::new();
//!     let client_log = Arc::new(Log::new(NodeId::new("client"), MemoryStore::new()));
//!     let server_log = Arc::new(Log::new(NodeId::new("server"), MemoryStore::new()));
//!
//!     let server = Node::server(server_log, pair.right.clone(), NodeConfig::default(), NodeHooks::new())?;
//!     let client = Node::client(client_log, pair.left.clone(), NodeConfig::default(), NodeHooks::new())?;
//!     client.connect().await?;
//!     client.wait_for_state(NodeState::Synchronized).await?;
//!     server.destroy();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod node;
pub mod validate;

pub use codec::MetaCodec;
pub use config::{
    AuthRequest, Authenticator, ConnectCheck, NodeConfig, NodeHooks, PeerInfo, SyncHooks,
    DEFAULT_SUBPROTOCOL, PROTOCOL_VERSION,
};
pub use connection::memory::{MemoryConnection, MemoryPair};
pub use connection::{Connection, ConnectionEvent};
pub use error::{ErrorKind, HookError, HookResult, Result, SyncError};
pub use messages::{ConnectOptions, Message, WireMeta};
pub use node::{DebugMessage, Node, NodeState, NodeStatus, Role, Unsubscribe};
pub use validate::validate;
