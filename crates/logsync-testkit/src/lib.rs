//! # logsync testkit
//!
//! Testing utilities for logsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a hand-driven clock, in-memory logs and node pairs
//!   wired over an in-process connection
//! - **Generators**: proptest strategies for ids and metadata
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use logsync_testkit::fixtures::{connected_pair, TestLog};
//!
//! async fn example() {
//!     let client = TestLog::new("client");
//!     let server = TestLog::new("server");
//!     let pair = connected_pair(&client, &server).await.unwrap();
//!     client.add("A").await;
//!     pair.server.wait_for(|s| s.syncing == 0).await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use logsync_testkit::generators::meta;
//!
//! proptest! {
//!     #[test]
//!     fn meta_survives_the_wire(meta in meta()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{connected_pair, node_pair, ManualClock, NodePair, TestLog};
pub use generators::{action_id, meta, node_id};
