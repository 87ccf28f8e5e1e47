//! The driver task: owns the session and dispatches events in arrival order.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use logsync_core::{Action, ActionId, Meta};
use logsync_log::{Log, LogStore, Subscription};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::events::NodeEvents;
use super::{Command, NodeState, NodeStatus, Role};
use crate::codec::MetaCodec;
use crate::config::{NodeConfig, NodeHooks};
use crate::connection::{Connection, ConnectionEvent};
use crate::error::{ErrorKind, Result, SyncError};
use crate::messages::Message;

/// Ids of received actions whose `add` event must not be echoed back.
pub(super) type ReceivedSet = Arc<Mutex<HashSet<ActionId>>>;

pub(super) fn lock_received(received: &ReceivedSet) -> MutexGuard<'_, HashSet<ActionId>> {
    received.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event sources the driver selects over.
pub(crate) struct Inbox {
    pub(crate) connection: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) adds: mpsc::UnboundedReceiver<(Action, Meta)>,
    pub(crate) subscription: Subscription,
}

pub(crate) struct Driver<S: LogStore> {
    pub(super) role: Role,
    pub(super) log: Arc<Log<S>>,
    pub(super) connection: Arc<dyn Connection>,
    pub(super) config: NodeConfig,
    pub(super) hooks: NodeHooks,
    pub(super) events: NodeEvents,
    pub(super) status: NodeStatus,
    status_tx: watch::Sender<NodeStatus>,
    cancel: CancellationToken,
    stopping: bool,

    pub(super) local_headers: Map<String, Value>,
    /// Highest local `added` the peer acknowledged.
    pub(super) last_sent: u64,
    /// Highest peer `added` stored locally.
    pub(super) last_received: u64,
    pub(super) last_added_cache: u64,
    /// Highest `added` already covered by a `sync_since` batch.
    pub(super) synced_through: u64,
    pub(super) connect_sent_at: Option<i64>,
    pub(super) received: ReceivedSet,

    /// Deadlines of outstanding requests, oldest first.
    pub(super) timeouts: VecDeque<Instant>,
    pub(super) ping_at: Option<Instant>,
    /// Messages that arrived before authentication.
    unauthenticated: VecDeque<Message>,
}

impl<S: LogStore + 'static> Driver<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        role: Role,
        log: Arc<Log<S>>,
        connection: Arc<dyn Connection>,
        config: NodeConfig,
        hooks: NodeHooks,
        events: NodeEvents,
        status_tx: watch::Sender<NodeStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let status = status_tx.borrow().clone();
        Self {
            role,
            log,
            connection,
            config,
            hooks,
            events,
            status,
            status_tx,
            cancel,
            stopping: false,
            local_headers: Map::new(),
            last_sent: 0,
            last_received: 0,
            last_added_cache: 0,
            synced_through: 0,
            connect_sent_at: None,
            received: Arc::new(Mutex::new(HashSet::new())),
            timeouts: VecDeque::new(),
            ping_at: None,
            unauthenticated: VecDeque::new(),
        }
    }

    /// Run until destroyed, until the connection source closes, or until a
    /// fatal error is raised with nobody listening.
    pub(crate) async fn run(mut self, mut inbox: Inbox) -> Result<()> {
        let result = self.run_loop(&mut inbox).await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "node stopped on unhandled error");
        }
        self.shutdown();
        inbox.subscription.unsubscribe();
        result
    }

    async fn run_loop(&mut self, inbox: &mut Inbox) -> Result<()> {
        let synced = self.log.store().get_last_synced().await?;
        self.last_sent = synced.sent;
        self.last_received = synced.received;
        self.last_added_cache = self.log.store().get_last_added().await?;

        if self.connection.connected() {
            self.on_connect()?;
            self.publish();
        }

        loop {
            if self.stopping {
                return Ok(());
            }
            let ping_at = self.ping_at;
            let timeout_at = self.timeouts.front().copied();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                Some(command) = inbox.commands.recv() => self.on_command(command)?,

                event = inbox.connection.recv() => match event {
                    Some(event) => self.on_connection_event(event).await?,
                    None => return Ok(()),
                },

                Some((action, meta)) = inbox.adds.recv() => self.on_log_add(action, meta).await?,

                _ = sleep_until(ping_at.unwrap_or_else(Instant::now)), if ping_at.is_some() => {
                    self.on_ping_due()?
                }

                _ = sleep_until(timeout_at.unwrap_or_else(Instant::now)), if timeout_at.is_some() => {
                    self.on_timeout()?
                }
            }

            self.publish();
        }
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        self.timeouts.clear();
        self.ping_at = None;
        self.connection.disconnect(Some("destroy"));
        self.status.connected = false;
        self.status.authenticated = false;
        self.status.syncing = 0;
        self.set_state(NodeState::Disconnected);
        self.publish();
        tracing::debug!("node destroyed");
    }

    /// Stop after the current event.
    pub(super) fn stop(&mut self) {
        self.stopping = true;
        self.cancel.cancel();
    }

    pub(super) fn publish(&self) {
        self.status_tx.send_if_modified(|published| {
            if *published == self.status {
                false
            } else {
                *published = self.status.clone();
                true
            }
        });
    }

    pub(super) fn set_state(&mut self, state: NodeState) {
        if self.status.state == state {
            return;
        }
        tracing::debug!(from = %self.status.state, to = %state, "state changed");
        self.status.state = state;
        self.publish();
        self.events.state.emit(&state);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// Emit an error. Returns it back when it is fatal and nobody listens,
    /// which stops the driver.
    pub(super) fn raise(&mut self, err: SyncError) -> Result<()> {
        match &err {
            SyncError::Protocol(_) | SyncError::Remote(_) => {
                tracing::warn!(error = %err, "protocol error")
            }
            _ => tracing::error!(error = %err, "node error"),
        }
        let handled = self.events.error.emit(&err);
        if !handled && err.is_fatal() {
            return Err(err);
        }
        Ok(())
    }

    /// Send a protocol error to the peer and report it locally.
    ///
    /// The peer caused it, so it is never rethrown.
    pub(super) fn send_error(&mut self, kind: ErrorKind) -> Result<()> {
        tracing::warn!(error = %kind, "rejecting peer");
        self.send(Message::Error(kind.clone()))?;
        self.events.error.emit(&SyncError::Protocol(kind));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────────

    pub(super) fn send(&mut self, message: Message) -> Result<()> {
        if !self.connection.connected() {
            tracing::debug!(message = message.name(), "connection closed, message dropped");
            return Ok(());
        }
        self.delay_ping();
        tracing::trace!(message = message.name(), "send");
        match self.connection.send(message.to_value()) {
            Ok(()) => Ok(()),
            Err(err) => self.raise(err),
        }
    }

    /// Codec for the current connection.
    pub(super) fn codec(&self) -> MetaCodec {
        let local = self.log.node_id().clone();
        let peer = self
            .status
            .remote_node_id
            .clone()
            .unwrap_or_else(|| local.clone());
        MetaCodec::new(local, peer)
            .with_base_time(self.status.base_time)
            .with_time_fix(self.status.time_fix)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetLocalHeaders(headers) => self.set_local_headers(headers),
            Command::SendDebug(text) => self.send(Message::Debug {
                kind: "error".into(),
                text,
            }),
        }
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::Connecting => {
                self.set_state(NodeState::Connecting);
                Ok(())
            }
            ConnectionEvent::Connect => self.on_connect(),
            ConnectionEvent::Disconnect(reason) => {
                self.on_disconnect(reason.as_deref());
                Ok(())
            }
            ConnectionEvent::Message(value) => self.on_message(value).await,
            ConnectionEvent::Error(message) => self.raise(SyncError::Connection(message)),
        }
    }

    async fn on_message(&mut self, value: Value) -> Result<()> {
        let message = match Message::from_value(&value) {
            Ok(message) => message,
            Err(kind) => {
                self.send_error(kind)?;
                self.connection.disconnect(Some("error"));
                return Ok(());
            }
        };
        self.delay_ping();

        if !self.status.authenticated && !Message::allowed_before_auth(message.name()) {
            tracing::debug!(message = message.name(), "buffered until authenticated");
            self.unauthenticated.push_back(message);
            return Ok(());
        }

        self.dispatch(message).await?;

        while self.status.authenticated && !self.stopping {
            let Some(message) = self.unauthenticated.pop_front() else {
                break;
            };
            self.dispatch(message).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, message: Message) -> Result<()> {
        tracing::trace!(message = message.name(), "receive");
        match message {
            Message::Connect {
                protocol,
                node_id,
                synced,
                options,
            } => self.on_connect_message(protocol, node_id, synced, options).await,
            Message::Connected {
                protocol,
                node_id,
                time,
                options,
            } => self.on_connected_message(protocol, node_id, time, options).await,
            Message::Ping(_) => self.on_ping_message(),
            Message::Pong(_) => {
                self.on_pong_message();
                Ok(())
            }
            Message::Sync { added, entries } => self.on_sync_message(added, entries).await,
            Message::Synced(added) => self.on_synced_message(added).await,
            Message::Error(kind) => self.raise(SyncError::Remote(kind)),
            Message::Debug { kind, text } => {
                self.on_debug_message(kind, text);
                Ok(())
            }
            Message::Headers(headers) => {
                self.on_headers_message(headers);
                Ok(())
            }
        }
    }

    /// Reset the session after the connection closed.
    fn on_disconnect(&mut self, reason: Option<&str>) {
        tracing::debug!(reason = ?reason, "disconnected");
        self.timeouts.clear();
        self.ping_at = None;
        self.connect_sent_at = None;
        self.unauthenticated.clear();
        lock_received(&self.received).clear();
        self.status.connected = false;
        self.status.authenticated = false;
        self.status.syncing = 0;
        self.set_state(NodeState::Disconnected);
        self.role_on_disconnect();
    }
}
