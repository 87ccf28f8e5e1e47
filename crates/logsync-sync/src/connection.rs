//! Connection abstraction for the sync protocol.
//!
//! A connection moves already-decoded JSON messages between two nodes.
//! Implementations may use WebSockets, HTTP, or any other transport; the
//! node never dials sockets itself.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Events a connection reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connection attempt started.
    Connecting,
    /// The connection is open.
    Connect,
    /// The connection closed, with an optional reason.
    Disconnect(Option<String>),
    /// A message arrived.
    Message(Value),
    /// A transport failure that did not close the connection.
    Error(String),
}

/// Duplex message channel between two nodes.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the connection is currently open.
    fn connected(&self) -> bool;

    /// Open the connection.
    async fn connect(&self) -> Result<()>;

    /// Close the connection. No-op when already closed.
    fn disconnect(&self, reason: Option<&str>);

    /// Send a message to the other side.
    fn send(&self, message: Value) -> Result<()>;

    /// Subscribe to connection events, in the order they happen.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent>;
}

/// An in-process connection pair.
///
/// Messages sent on one end arrive on the other in order. Every sent
/// message is also recorded so tests can inspect the traffic.
pub mod memory {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use crate::error::SyncError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Side {
        Left,
        Right,
    }

    impl Side {
        fn index(self) -> usize {
            match self {
                Side::Left => 0,
                Side::Right => 1,
            }
        }

        fn other(self) -> Side {
            match self {
                Side::Left => Side::Right,
                Side::Right => Side::Left,
            }
        }
    }

    #[derive(Default)]
    struct PairState {
        connected: bool,
        subscribers: [Vec<mpsc::UnboundedSender<ConnectionEvent>>; 2],
        sent: [Vec<Value>; 2],
    }

    impl PairState {
        fn emit(&mut self, side: Side, event: &ConnectionEvent) {
            self.subscribers[side.index()].retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Both ends of an in-process connection.
    pub struct MemoryPair {
        pub left: MemoryConnection,
        pub right: MemoryConnection,
    }

    impl MemoryPair {
        /// Create a closed pair.
        pub fn new() -> Self {
            let state = Arc::new(Mutex::new(PairState::default()));
            Self {
                left: MemoryConnection {
                    state: Arc::clone(&state),
                    side: Side::Left,
                },
                right: MemoryConnection {
                    state,
                    side: Side::Right,
                },
            }
        }
    }

    impl Default for MemoryPair {
        fn default() -> Self {
            Self::new()
        }
    }

    /// One end of a [`MemoryPair`].
    #[derive(Clone)]
    pub struct MemoryConnection {
        state: Arc<Mutex<PairState>>,
        side: Side,
    }

    impl MemoryConnection {
        fn lock(&self) -> MutexGuard<'_, PairState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Messages sent from this end so far.
        pub fn sent(&self) -> Vec<Value> {
            self.lock().sent[self.side.index()].clone()
        }

        /// Tags of the messages sent from this end so far.
        pub fn sent_tags(&self) -> Vec<String> {
            self.sent()
                .iter()
                .filter_map(|m| m.get(0).and_then(Value::as_str).map(str::to_string))
                .collect()
        }

        /// Report a transport failure to this end's subscribers.
        pub fn fail(&self, message: impl Into<String>) {
            let event = ConnectionEvent::Error(message.into());
            self.lock().emit(self.side, &event);
        }
    }

    impl std::fmt::Debug for MemoryConnection {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MemoryConnection")
                .field("side", &self.side)
                .field("connected", &self.connected())
                .finish()
        }
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        fn connected(&self) -> bool {
            self.lock().connected
        }

        async fn connect(&self) -> Result<()> {
            let mut state = self.lock();
            if state.connected {
                return Ok(());
            }
            state.emit(self.side, &ConnectionEvent::Connecting);
            state.connected = true;
            state.emit(self.side, &ConnectionEvent::Connect);
            state.emit(self.side.other(), &ConnectionEvent::Connect);
            Ok(())
        }

        fn disconnect(&self, reason: Option<&str>) {
            let mut state = self.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            let event = ConnectionEvent::Disconnect(reason.map(str::to_string));
            state.emit(self.side, &event);
            state.emit(self.side.other(), &event);
        }

        fn send(&self, message: Value) -> Result<()> {
            let mut state = self.lock();
            if !state.connected {
                return Err(SyncError::Connection("connection is closed".into()));
            }
            state.sent[self.side.index()].push(message.clone());
            state.emit(self.side.other(), &ConnectionEvent::Message(message));
            Ok(())
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lock().subscribers[self.side.index()].push(tx);
            rx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPair;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_pair_delivers_in_order() {
        let pair = MemoryPair::new();
        let mut left_events = pair.left.subscribe();
        let mut right_events = pair.right.subscribe();

        assert!(pair.left.send(json!(["ping", 1])).is_err());

        pair.left.connect().await.unwrap();
        assert!(pair.right.connected());
        assert_eq!(left_events.recv().await, Some(ConnectionEvent::Connecting));
        assert_eq!(left_events.recv().await, Some(ConnectionEvent::Connect));
        assert_eq!(right_events.recv().await, Some(ConnectionEvent::Connect));

        pair.left.send(json!(["ping", 1])).unwrap();
        pair.left.send(json!(["ping", 2])).unwrap();
        assert_eq!(
            right_events.recv().await,
            Some(ConnectionEvent::Message(json!(["ping", 1])))
        );
        assert_eq!(
            right_events.recv().await,
            Some(ConnectionEvent::Message(json!(["ping", 2])))
        );
        assert_eq!(pair.left.sent_tags(), vec!["ping", "ping"]);
        assert!(pair.right.sent().is_empty());
    }

    #[tokio::test]
    async fn test_memory_pair_disconnect_reaches_both_sides() {
        let pair = MemoryPair::new();
        pair.right.connect().await.unwrap();
        let mut left_events = pair.left.subscribe();
        let mut right_events = pair.right.subscribe();

        pair.right.disconnect(Some("destroy"));
        pair.right.disconnect(None);
        assert!(!pair.left.connected());

        let expected = Some(ConnectionEvent::Disconnect(Some("destroy".into())));
        assert_eq!(left_events.recv().await, expected);
        assert_eq!(right_events.recv().await, expected);
    }
}
