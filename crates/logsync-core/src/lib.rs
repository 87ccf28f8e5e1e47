//! # logsync Core
//!
//! Pure primitives for logsync: actions, their metadata, causal ids and
//! the causal order used everywhere to sort log entries.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Action`] - An open JSON object with a required `type`
//! - [`Meta`] - The metadata envelope (id, time, added, reasons, indexes)
//! - [`ActionId`] - Causal id: (time, origin node, sequence)
//! - [`NodeId`] - Identifier of one log owner
//!
//! ## Ordering
//!
//! [`is_first_older`] compares `time`, then origin node, then sequence.
//! Stores use it for insertion order and for `olderThan`/`youngerThan`
//! range filters.

pub mod action;
pub mod clock;
pub mod compare;
pub mod error;
pub mod id;
pub mod meta;
pub mod types;

pub use action::Action;
pub use clock::{Clock, SystemClock};
pub use compare::{causal_cmp, is_first_older};
pub use error::{CoreError, Result};
pub use id::IdGenerator;
pub use meta::{Meta, MetaDiff, NewMeta, READ_ONLY_FIELDS};
pub use types::{ActionId, NodeId};
