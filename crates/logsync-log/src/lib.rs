//! # logsync Log
//!
//! The reason-counted action log and the storage contract behind it.
//!
//! ## Overview
//!
//! [`Log`] is what applications and sync nodes talk to. It issues causal
//! ids, runs `preadd` listeners, drops actions that end up with no reasons
//! and notifies `add`/`clean` listeners. Persistence is delegated to a
//! [`LogStore`]; [`MemoryStore`] is the reference implementation.
//!
//! ## Key Types
//!
//! - [`Log`] - The log façade
//! - [`LogStore`] - The async trait every store implements
//! - [`MemoryStore`] - In-memory store for tests and short-lived processes
//! - [`AddResult`] - Result of adding an action
//! - [`RemoveCriteria`] - Range filter for reason removal
//!
//! ## Usage
//!
//! ```rust,no_run
//! use logsync_core::{Action, NewMeta, NodeId};
//! use logsync_log::{Log, MemoryStore};
//!
//! async fn example() {
//!     let log = Log::new(NodeId::new("server"), MemoryStore::new());
//!     let _sub = log.on_add(|action, meta| println!("{} {}", action.action_type(), meta.id));
//!
//!     // Kept until the "tab" reason is removed
//!     log.add(Action::new("user/rename"), NewMeta::new().reason("tab"))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent adds**: adding a known id returns `AlreadyPresent`
//! - **Reason GC**: entries are removed as soon as their reasons are empty
//! - **Ephemeral actions**: reasonless actions are announced, never stored

pub mod error;
pub mod listeners;
pub mod log;
pub mod memory;
pub mod traits;

pub use error::{LogError, LogResult, Result, StoreError};
pub use listeners::{Listener, LogEvent, PreAddListener, Subscription};
pub use log::{Log, Visit};
pub use memory::MemoryStore;
pub use traits::{
    AddResult, Entry, LastSynced, LogStore, Order, Page, PageCursor, Query, RemoveCriteria,
    RemovedCallback, SyncedUpdate,
};
