//! Listener lists for node notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{Map, Value};

use super::NodeState;
use crate::error::SyncError;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// A list of callbacks for one kind of notification.
pub(crate) struct Emitter<T> {
    inner: Arc<Mutex<Listeners<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> Emitter<T> {
    fn lock(&self) -> MutexGuard<'_, Listeners<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn on(&self, callback: Callback<T>) -> Unsubscribe {
        let id = {
            let mut listeners = self.lock();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners.callbacks.push((id, callback));
            id
        };
        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.inner);
        Unsubscribe(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut listeners = inner.lock().unwrap_or_else(PoisonError::into_inner);
                listeners.callbacks.retain(|(other, _)| *other != id);
            }
        }))
    }

    /// Call every listener. Returns false if nobody listens.
    pub(crate) fn emit(&self, value: &T) -> bool {
        let callbacks: Vec<Callback<T>> = self
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in &callbacks {
            callback(value);
        }
        !callbacks.is_empty()
    }
}

/// Handle returned by node listener registrations.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Unsubscribe(Box<dyn FnOnce() + Send + Sync>);

impl Unsubscribe {
    /// Remove the listener.
    pub fn unsubscribe(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// A `debug` message received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub kind: String,
    pub text: String,
}

/// Every notification a node emits.
#[derive(Clone, Default)]
pub(crate) struct NodeEvents {
    pub(crate) state: Emitter<NodeState>,
    pub(crate) error: Emitter<SyncError>,
    pub(crate) debug: Emitter<DebugMessage>,
    pub(crate) headers: Emitter<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_unsubscribe() {
        let emitter: Emitter<u32> = Emitter::default();
        assert!(!emitter.emit(&1));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = emitter.on(Arc::new(move |v: &u32| sink.lock().unwrap().push(*v)));

        assert!(emitter.emit(&2));
        handle.unsubscribe();
        assert!(!emitter.emit(&3));
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
