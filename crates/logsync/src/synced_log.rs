//! A log together with the defaults for the nodes that sync it.
//!
//! One [`SyncedLog`] usually serves many connections: a server accepts one
//! connection per client and starts a server node for each, all sharing
//! the same log.

use std::sync::Arc;

use logsync_core::{Action, ActionId, Clock, NewMeta, NodeId};
use logsync_log::{AddResult, Entry, Log, LogStore, Query, RemoveCriteria, Visit};
use logsync_sync::{Connection, Node, NodeConfig, NodeHooks};

use crate::error::Result;

/// Defaults applied to every node started from a [`SyncedLog`].
#[derive(Debug, Clone, Default)]
pub struct SyncedLogConfig {
    /// Node configuration.
    pub node: NodeConfig,
}

impl SyncedLogConfig {
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }
}

/// A log plus node defaults.
pub struct SyncedLog<S: LogStore> {
    log: Arc<Log<S>>,
    config: SyncedLogConfig,
}

impl<S: LogStore + 'static> SyncedLog<S> {
    pub fn new(node_id: NodeId, store: S, config: SyncedLogConfig) -> Self {
        Self::from_log(Arc::new(Log::new(node_id, store)), config)
    }

    pub fn with_clock(
        node_id: NodeId,
        store: S,
        clock: Arc<dyn Clock>,
        config: SyncedLogConfig,
    ) -> Self {
        Self::from_log(Arc::new(Log::with_clock(node_id, store, clock)), config)
    }

    pub fn from_log(log: Arc<Log<S>>, config: SyncedLogConfig) -> Self {
        Self { log, config }
    }

    pub fn node_id(&self) -> &NodeId {
        self.log.node_id()
    }

    /// The shared log. Listeners registered here see additions from every
    /// connection.
    pub fn log(&self) -> &Arc<Log<S>> {
        &self.log
    }

    pub fn config(&self) -> &SyncedLogConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add an action. Connected nodes forward it to their peers.
    pub async fn add(&self, action: Action, meta: NewMeta) -> Result<AddResult> {
        Ok(self.log.add(action, meta).await?)
    }

    pub async fn by_id(&self, id: &ActionId) -> Result<Option<Entry>> {
        Ok(self.log.by_id(id).await?)
    }

    pub async fn remove_reason(&self, reason: &str, criteria: &RemoveCriteria) -> Result<()> {
        Ok(self.log.remove_reason(reason, criteria).await?)
    }

    /// Every stored entry in creation order, oldest first.
    pub async fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        self.log
            .each(&Query::created(), |action, meta| {
                entries.push((action.clone(), meta.clone()));
                Visit::Continue
            })
            .await?;
        entries.reverse();
        Ok(entries)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a client node over `connection`. Call [`Node::connect`] to
    /// open it.
    pub fn client<C>(&self, connection: C, hooks: NodeHooks) -> Result<Node>
    where
        C: Connection + 'static,
    {
        tracing::debug!(node = %self.node_id(), "starting client node");
        let node = Node::client(
            Arc::clone(&self.log),
            connection,
            self.config.node.clone(),
            hooks,
        )?;
        Ok(node)
    }

    /// Start a server node over an accepted connection.
    pub fn server<C>(&self, connection: C, hooks: NodeHooks) -> Result<Node>
    where
        C: Connection + 'static,
    {
        tracing::debug!(node = %self.node_id(), "starting server node");
        let node = Node::server(
            Arc::clone(&self.log),
            connection,
            self.config.node.clone(),
            hooks,
        )?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsync_log::MemoryStore;
    use logsync_sync::{MemoryPair, NodeState};

    #[tokio::test]
    async fn test_entries_are_oldest_first() {
        let log = SyncedLog::new(
            NodeId::new("a"),
            MemoryStore::new(),
            SyncedLogConfig::default(),
        );
        log.add(Action::new("one"), NewMeta::new().reason("r").time(1))
            .await
            .unwrap();
        log.add(Action::new("two"), NewMeta::new().reason("r").time(2))
            .await
            .unwrap();

        let types: Vec<_> = log
            .entries()
            .await
            .unwrap()
            .iter()
            .map(|(action, _)| action.action_type().to_string())
            .collect();
        assert_eq!(types, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_server_config_is_validated() {
        let config = SyncedLogConfig::default().with_node(NodeConfig::default().with_fix_time(true));
        let log = SyncedLog::new(NodeId::new("server"), MemoryStore::new(), config);
        let pair = MemoryPair::new();
        assert!(log.server(pair.right, NodeHooks::new()).is_err());
    }

    #[tokio::test]
    async fn test_two_logs_sync_through_nodes() {
        let server = SyncedLog::new(
            NodeId::new("server"),
            MemoryStore::new(),
            SyncedLogConfig::default(),
        );
        let client = SyncedLog::new(
            NodeId::new("client"),
            MemoryStore::new(),
            SyncedLogConfig::default(),
        );
        client
            .add(Action::new("hello"), NewMeta::new().reason("r"))
            .await
            .unwrap();

        let pair = MemoryPair::new();
        let server_node = server.server(pair.right.clone(), NodeHooks::new()).unwrap();
        let client_node = client.client(pair.left.clone(), NodeHooks::new()).unwrap();
        client_node.connect().await.unwrap();
        client_node
            .wait_for_state(NodeState::Synchronized)
            .await
            .unwrap();

        assert_eq!(server.entries().await.unwrap().len(), 1);
        client_node.destroy();
        server_node.join().await.unwrap();
    }
}
