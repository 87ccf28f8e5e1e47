//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use logsync_core::{Action, Clock, Meta, NewMeta, NodeId};
use logsync_log::{AddResult, Entry, Log, MemoryStore, Query, Visit};
use logsync_sync::{MemoryPair, Node, NodeConfig, NodeHooks, NodeState, Result};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// An in-memory log driven by a [`ManualClock`].
#[derive(Clone)]
pub struct TestLog {
    pub log: Arc<Log<MemoryStore>>,
    pub clock: ManualClock,
}

impl TestLog {
    pub fn new(node_id: &str) -> Self {
        Self::with_clock(node_id, ManualClock::default())
    }

    pub fn with_clock(node_id: &str, clock: ManualClock) -> Self {
        let log = Log::with_clock(
            NodeId::new(node_id),
            MemoryStore::new(),
            Arc::new(clock.clone()),
        );
        Self {
            log: Arc::new(log),
            clock,
        }
    }

    /// Add an action of `action_type` kept alive by the `test` reason.
    ///
    /// Panics if the log refuses it.
    pub async fn add(&self, action_type: &str) -> Meta {
        self.add_with(Action::new(action_type), NewMeta::new().reason("test"))
            .await
    }

    /// Add an action, returning its stored meta.
    ///
    /// Panics if the log refuses it.
    pub async fn add_with(&self, action: Action, meta: NewMeta) -> Meta {
        match self.log.add(action, meta).await {
            Ok(AddResult::Added(meta)) => meta,
            other => panic!("action was not added: {other:?}"),
        }
    }

    /// All stored entries, oldest first.
    pub async fn entries(&self) -> Vec<Entry> {
        let mut entries = Vec::new();
        self.log
            .each(&Query::created(), |action, meta| {
                entries.push((action.clone(), meta.clone()));
                Visit::Continue
            })
            .await
            .unwrap_or_else(|err| panic!("failed to read log: {err}"));
        entries.reverse();
        entries
    }

    /// Action types of all stored entries, oldest first.
    pub async fn action_types(&self) -> Vec<String> {
        self.entries()
            .await
            .iter()
            .map(|(action, _)| action.action_type().to_string())
            .collect()
    }
}

/// A client and a server wired over one in-process connection.
pub struct NodePair {
    pub client: Node,
    pub server: Node,
    pub connection: MemoryPair,
}

impl NodePair {
    pub fn destroy(&self) {
        self.client.destroy();
        self.server.destroy();
    }
}

/// Start a client and a server node without connecting them.
pub fn node_pair(
    client: &TestLog,
    server: &TestLog,
    client_config: NodeConfig,
    server_config: NodeConfig,
) -> Result<NodePair> {
    let connection = MemoryPair::new();
    let server = Node::server(
        Arc::clone(&server.log),
        connection.right.clone(),
        server_config,
        NodeHooks::new(),
    )?;
    let client = Node::client(
        Arc::clone(&client.log),
        connection.left.clone(),
        client_config,
        NodeHooks::new(),
    )?;
    Ok(NodePair {
        client,
        server,
        connection,
    })
}

/// Start a client and a server and wait until both are synchronized.
pub async fn connected_pair(client: &TestLog, server: &TestLog) -> Result<NodePair> {
    let pair = node_pair(client, server, NodeConfig::default(), NodeConfig::default())?;
    pair.client.connect().await?;
    pair.client.wait_for_state(NodeState::Synchronized).await?;
    pair.server.wait_for_state(NodeState::Synchronized).await?;
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_on_demand() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_millis(), 10);
        clock.advance(5);
        assert_eq!(clock.now_millis(), 15);
        clock.set(3);
        assert_eq!(clock.now_millis(), 3);
    }

    #[tokio::test]
    async fn test_log_entries_are_oldest_first() {
        let log = TestLog::new("a");
        log.add("first").await;
        log.clock.advance(1);
        log.add("second").await;
        assert_eq!(log.action_types().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_connected_pair_syncs_existing_actions() {
        let client = TestLog::new("client");
        let server = TestLog::new("server");
        client.add("A").await;

        let pair = connected_pair(&client, &server).await.unwrap();
        assert_eq!(server.action_types().await, vec!["A"]);
        pair.destroy();
    }
}
