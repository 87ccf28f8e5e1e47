//! # logsync
//!
//! Keep action logs converged between two peers.
//!
//! ## Overview
//!
//! logsync is an offline-first library for:
//!
//! - **Logs**: append-only, reason-counted stores of actions, totally
//!   ordered by causal id
//! - **Stores**: a pluggable persistence contract with an in-memory
//!   reference implementation
//! - **Sync**: a node per connection that authenticates the peer, fixes
//!   clock skew and exchanges every action the other side is missing
//!
//! ## Key Concepts
//!
//! - **Action**: an application record with a `type`.
//! - **Meta**: id, time, store-local `added` sequence and reasons.
//! - **Reason**: a named reference; actions without reasons are dropped.
//! - **Node**: one endpoint of the protocol over one connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use logsync::{Action, MemoryPair, MemoryStore, NewMeta, NodeHooks, NodeId, NodeState};
//! use logsync::{SyncedLog, SyncedLogConfig};
//!
//! async fn example() -> logsync::Result<()> {
//!     let server = SyncedLog::new(NodeId::new("server"), MemoryStore::new(), SyncedLogConfig::default());
//!     let client = SyncedLog::new(NodeId::new("client"), MemoryStore::new(), SyncedLogConfig::default());
//!
//!     client.add(Action::new("user/rename").with("name", "Ada"), NewMeta::new().reason("user")).await?;
//!
//!     let pair = MemoryPair::new();
//!     let _server_node = server.server(pair.right.clone(), NodeHooks::new())?;
//!     let client_node = client.client(pair.left.clone(), NodeHooks::new())?;
//!     client_node.connect().await?;
//!     client_node.wait_for_state(NodeState::Synchronized).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod synced_log;

pub use error::{Error, Result};
pub use synced_log::{SyncedLog, SyncedLogConfig};

// Re-export core types
pub use logsync_core::{
    causal_cmp, is_first_older, Action, ActionId, Clock, CoreError, IdGenerator, Meta, MetaDiff,
    NewMeta, NodeId, SystemClock,
};

// Re-export log types
pub use logsync_log::{
    AddResult, Entry, LastSynced, Log, LogError, LogEvent, LogStore, MemoryStore, Order, Page,
    PageCursor, Query, RemoveCriteria, StoreError, Subscription, SyncedUpdate, Visit,
};

// Re-export sync types
pub use logsync_sync::{
    AuthRequest, Authenticator, Connection, ConnectionEvent, DebugMessage, ErrorKind, HookError,
    HookResult, MemoryConnection, MemoryPair, Message, MetaCodec, Node, NodeConfig, NodeHooks,
    NodeState, NodeStatus, PeerInfo, Role, SyncError, SyncHooks, Unsubscribe, PROTOCOL_VERSION,
};
