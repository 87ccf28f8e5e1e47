//! Sync node: one endpoint of the protocol, wrapping one connection.
//!
//! A [`Node`] is a cheap handle. The protocol itself runs in a driver task
//! that owns all session state and handles one event at a time: connection
//! events, local log additions, handle commands, and ping/timeout
//! deadlines. Handlers for each protocol feature live in their own module.
//!
//! ## State Machine
//!
//! ```text
//! disconnected -> connecting -> sending <-> synchronized
//!       ^______________|____________|___________|
//! ```
//!
//! `sending` while at least one sent batch is not yet acknowledged.

mod connect;
mod debug;
mod driver;
mod events;
mod ping;
mod role;
mod sync;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use logsync_core::NodeId;
use logsync_log::{Log, LogStore};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{NodeConfig, NodeHooks};
use crate::connection::Connection;
use crate::error::{Result, SyncError};

use driver::{Driver, Inbox};
use events::NodeEvents;

pub use events::{DebugMessage, Unsubscribe};
pub use role::Role;

/// Connection state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Disconnected,
    Connecting,
    Sending,
    Synchronized,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeState::Disconnected => "disconnected",
            NodeState::Connecting => "connecting",
            NodeState::Sending => "sending",
            NodeState::Synchronized => "synchronized",
        })
    }
}

/// Snapshot of a node's session, published after every event.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub state: NodeState,
    pub connected: bool,
    pub authenticated: bool,
    pub remote_node_id: Option<NodeId>,
    pub remote_protocol: Option<u32>,
    pub remote_subprotocol: Option<String>,
    pub remote_headers: Map<String, Value>,
    /// Local clock minus peer clock, in milliseconds.
    pub time_fix: i64,
    /// Time origin of the current connection.
    pub base_time: i64,
    /// Sent batches waiting for `synced`.
    pub syncing: usize,
}

impl NodeStatus {
    fn new(state: NodeState) -> Self {
        Self {
            state,
            connected: false,
            authenticated: false,
            remote_node_id: None,
            remote_protocol: None,
            remote_subprotocol: None,
            remote_headers: Map::new(),
            time_fix: 0,
            base_time: 0,
            syncing: 0,
        }
    }
}

/// Requests from the handle to the driver.
#[derive(Debug)]
pub(crate) enum Command {
    SetLocalHeaders(Map<String, Value>),
    SendDebug(String),
}

struct Inner {
    local_node_id: NodeId,
    role: Role,
    connection: Arc<dyn Connection>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<NodeStatus>,
    events: NodeEvents,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<Result<()>>>>,
}

/// Handle to a running sync node.
///
/// # Lifecycle
///
/// Construct one per connection with [`Node::client`] or [`Node::server`]
/// inside a Tokio runtime. [`Node::destroy`] stops the driver; a server
/// node also stops by itself when its connection closes. [`Node::join`]
/// waits for the driver and returns the fatal error that stopped it, if
/// any was raised with no error listener registered.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

impl Node {
    /// Start a client node. The client sends `connect` whenever the
    /// connection opens; call [`Node::connect`] to open it.
    pub fn client<S, C>(
        log: Arc<Log<S>>,
        connection: C,
        config: NodeConfig,
        hooks: NodeHooks,
    ) -> Result<Self>
    where
        S: LogStore + 'static,
        C: Connection + 'static,
    {
        Self::spawn(Role::Client, log, connection, config, hooks)
    }

    /// Start a server node over an accepted connection.
    pub fn server<S, C>(
        log: Arc<Log<S>>,
        connection: C,
        config: NodeConfig,
        hooks: NodeHooks,
    ) -> Result<Self>
    where
        S: LogStore + 'static,
        C: Connection + 'static,
    {
        Self::spawn(Role::Server, log, connection, config, hooks)
    }

    fn spawn<S, C>(
        role: Role,
        log: Arc<Log<S>>,
        connection: C,
        config: NodeConfig,
        hooks: NodeHooks,
    ) -> Result<Self>
    where
        S: LogStore + 'static,
        C: Connection + 'static,
    {
        config.validate(role == Role::Server)?;

        let local_node_id = log.node_id().clone();
        let connection: Arc<dyn Connection> = Arc::new(connection);
        let connection_events = connection.subscribe();

        let (add_tx, adds) = mpsc::unbounded_channel();
        let subscription = log.on_add(move |action, meta| {
            // The driver may be gone; nothing to do then.
            let _ = add_tx.send((action.clone(), meta.clone()));
        });

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(NodeStatus::new(role.initial_state()));
        let events = NodeEvents::default();
        let cancel = CancellationToken::new();

        let driver = Driver::new(
            role,
            log,
            Arc::clone(&connection),
            config,
            hooks,
            events.clone(),
            status_tx,
            cancel.clone(),
        );
        let inbox = Inbox {
            connection: connection_events,
            commands,
            adds,
            subscription,
        };
        let span = tracing::debug_span!("node", id = %local_node_id, role = ?role);
        let handle = tokio::spawn(driver.run(inbox).instrument(span));

        Ok(Self {
            inner: Arc::new(Inner {
                local_node_id,
                role,
                connection,
                commands: commands_tx,
                status: status_rx,
                events,
                cancel,
                driver: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Open the underlying connection.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.connect().await
    }

    /// Stop the node and close its connection. Idempotent.
    pub fn destroy(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Wait for the driver to stop.
    ///
    /// Returns the unhandled fatal error that stopped it, if any. Only the
    /// first caller observes the result; later calls return `Ok(())`.
    ///
    /// # Panics
    ///
    /// Resumes the driver's panic if it panicked.
    pub async fn join(&self) -> Result<()> {
        let handle = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(SyncError::Destroyed),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.inner.local_node_id
    }

    /// Latest published session snapshot.
    pub fn status(&self) -> NodeStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> NodeState {
        self.inner.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.status.borrow().authenticated
    }

    pub fn remote_node_id(&self) -> Option<NodeId> {
        self.inner.status.borrow().remote_node_id.clone()
    }

    pub fn remote_protocol(&self) -> Option<u32> {
        self.inner.status.borrow().remote_protocol
    }

    pub fn remote_subprotocol(&self) -> Option<String> {
        self.inner.status.borrow().remote_subprotocol.clone()
    }

    pub fn remote_headers(&self) -> Map<String, Value> {
        self.inner.status.borrow().remote_headers.clone()
    }

    pub fn time_fix(&self) -> i64 {
        self.inner.status.borrow().time_fix
    }

    pub fn base_time(&self) -> i64 {
        self.inner.status.borrow().base_time
    }

    /// Wait until the node reaches `state`.
    ///
    /// Fails with [`SyncError::Destroyed`] if the driver stops first.
    pub async fn wait_for_state(&self, state: NodeState) -> Result<()> {
        self.wait_for(|status| status.state == state).await
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<()>
    where
        F: FnMut(&NodeStatus) -> bool,
    {
        let mut status = self.inner.status.clone();
        status
            .wait_for(|s| predicate(s))
            .await
            .map(|_| ())
            .map_err(|_| SyncError::Destroyed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the headers sent to the peer. Sent right away when connected,
    /// otherwise before the next `connect`.
    pub fn set_local_headers(&self, headers: Map<String, Value>) -> Result<()> {
        self.command(Command::SetLocalHeaders(headers))
    }

    /// Send a `debug` error text to the peer.
    pub fn send_debug(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::SendDebug(text.into()))
    }

    fn command(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| SyncError::Destroyed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    pub fn on_state<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&NodeState) + Send + Sync + 'static,
    {
        self.inner.events.state.on(Arc::new(listener))
    }

    /// Listen for errors. While at least one error listener is registered,
    /// fatal errors are reported here instead of stopping the node.
    pub fn on_error<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.inner.events.error.on(Arc::new(listener))
    }

    pub fn on_debug<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&DebugMessage) + Send + Sync + 'static,
    {
        self.inner.events.debug.on(Arc::new(listener))
    }

    pub fn on_headers<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        self.inner.events.headers.on(Arc::new(listener))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("local_node_id", &self.inner.local_node_id)
            .field("role", &self.inner.role)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::MemoryPair;
    use logsync_core::{Action, NewMeta};
    use logsync_log::MemoryStore;

    fn log(id: &str) -> Arc<Log<MemoryStore>> {
        Arc::new(Log::new(NodeId::new(id), MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_initial_state_depends_on_role() {
        let pair = MemoryPair::new();
        let client = Node::client(
            log("c"),
            pair.left.clone(),
            NodeConfig::default(),
            NodeHooks::new(),
        )
        .unwrap();
        let server = Node::server(
            log("s"),
            pair.right.clone(),
            NodeConfig::default(),
            NodeHooks::new(),
        )
        .unwrap();

        assert_eq!(client.state(), NodeState::Disconnected);
        assert_eq!(server.state(), NodeState::Connecting);
        assert_eq!(client.role(), Role::Client);
        assert_eq!(server.local_node_id().as_str(), "s");
        client.destroy();
        server.destroy();
    }

    #[tokio::test]
    async fn test_sync_marks_acknowledged_actions() {
        let client_log = log("c");
        let server_log = log("s");
        client_log
            .add(Action::new("a"), NewMeta::new().reason("r"))
            .await
            .unwrap();

        let pair = MemoryPair::new();
        let server = Node::server(
            Arc::clone(&server_log),
            pair.right.clone(),
            NodeConfig::default(),
            NodeHooks::new(),
        )
        .unwrap();
        let client = Node::client(
            Arc::clone(&client_log),
            pair.left.clone(),
            NodeConfig::default(),
            NodeHooks::new(),
        )
        .unwrap();
        client.connect().await.unwrap();
        client.wait_for_state(NodeState::Synchronized).await.unwrap();

        let synced = client_log.store().get_last_synced().await.unwrap();
        assert_eq!(synced.sent, 1);
        let synced = server_log.store().get_last_synced().await.unwrap();
        assert_eq!(synced.received, 1);
        assert_eq!(client.status().syncing, 0);

        client.destroy();
        server.join().await.unwrap();
        assert!(server.is_destroyed());
    }

    #[tokio::test]
    async fn test_commands_fail_after_destroy() {
        let pair = MemoryPair::new();
        let client = Node::client(
            log("c"),
            pair.left.clone(),
            NodeConfig::default(),
            NodeHooks::new(),
        )
        .unwrap();
        client.destroy();
        client.join().await.unwrap();
        assert!(matches!(
            client.send_debug("late"),
            Err(SyncError::Destroyed)
        ));
        assert!(matches!(
            client.wait_for_state(NodeState::Synchronized).await,
            Err(SyncError::Destroyed)
        ));
    }
}
