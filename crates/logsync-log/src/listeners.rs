//! Typed listener registry for log events.
//!
//! General listeners receive every event of a kind. Typed listeners are
//! indexed by `(event, action type, action id field)` so hot paths only
//! see the actions they asked for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use logsync_core::{Action, Meta};

/// Log lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEvent {
    /// Before the persistence decision; listeners may edit the meta.
    PreAdd,
    /// The action was added (stored, or emitted as ephemeral).
    Add,
    /// The action left the log.
    Clean,
}

/// Read-only listener for `add` and `clean`.
pub type Listener = Arc<dyn Fn(&Action, &Meta) + Send + Sync>;

/// Listener for `preadd`, allowed to fill in reasons or `keep_last`.
pub type PreAddListener = Arc<dyn Fn(&Action, &mut Meta) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKey {
    event: LogEvent,
    action_type: String,
    entity_id: Option<String>,
}

#[derive(Clone)]
enum Callback {
    Read(Listener),
    Mutate(PreAddListener),
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    general: HashMap<LogEvent, Vec<(u64, Callback)>>,
    typed: HashMap<TypeKey, Vec<(u64, Callback)>>,
}

/// Handle returned by every registration.
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Safe to call after the log is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Registry {
    fn insert(&mut self, typed: Option<TypeKey>, event: LogEvent, callback: Callback) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        match typed {
            Some(key) => self.typed.entry(key).or_default().push((id, callback)),
            None => self.general.entry(event).or_default().push((id, callback)),
        }
        id
    }

    fn remove(&mut self, id: u64) {
        for list in self.general.values_mut() {
            list.retain(|(other, _)| *other != id);
        }
        self.typed.retain(|_, list| {
            list.retain(|(other, _)| *other != id);
            !list.is_empty()
        });
    }

    /// Callbacks for an event, most specific first.
    fn collect(&self, event: LogEvent, action: &Action) -> Vec<Callback> {
        let mut out = Vec::new();
        if !self.typed.is_empty() {
            let action_type = action.action_type().to_string();
            if let Some(entity_id) = action.entity_id() {
                let key = TypeKey {
                    event,
                    action_type: action_type.clone(),
                    entity_id: Some(entity_id.to_string()),
                };
                if let Some(list) = self.typed.get(&key) {
                    out.extend(list.iter().map(|(_, cb)| cb.clone()));
                }
            }
            let key = TypeKey {
                event,
                action_type,
                entity_id: None,
            };
            if let Some(list) = self.typed.get(&key) {
                out.extend(list.iter().map(|(_, cb)| cb.clone()));
            }
        }
        if let Some(list) = self.general.get(&event) {
            out.extend(list.iter().map(|(_, cb)| cb.clone()));
        }
        out
    }
}

/// Shared registry handle owned by a log.
#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<Mutex<Registry>>);

impl Listeners {
    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, typed: Option<TypeKey>, event: LogEvent, callback: Callback) -> Subscription {
        let id = self.lock().insert(typed, event, callback);
        Subscription {
            registry: Arc::downgrade(&self.0),
            id,
        }
    }

    pub(crate) fn on(&self, event: LogEvent, listener: Listener) -> Subscription {
        self.subscribe(None, event, Callback::Read(listener))
    }

    pub(crate) fn on_preadd(&self, listener: PreAddListener) -> Subscription {
        self.subscribe(None, LogEvent::PreAdd, Callback::Mutate(listener))
    }

    pub(crate) fn on_type(
        &self,
        event: LogEvent,
        action_type: &str,
        entity_id: Option<&str>,
        callback: Callback,
    ) -> Subscription {
        let key = TypeKey {
            event,
            action_type: action_type.to_string(),
            entity_id: entity_id.map(str::to_string),
        };
        self.subscribe(Some(key), event, callback)
    }

    pub(crate) fn on_type_read(
        &self,
        event: LogEvent,
        action_type: &str,
        entity_id: Option<&str>,
        listener: Listener,
    ) -> Subscription {
        self.on_type(event, action_type, entity_id, Callback::Read(listener))
    }

    pub(crate) fn on_type_preadd(
        &self,
        action_type: &str,
        entity_id: Option<&str>,
        listener: PreAddListener,
    ) -> Subscription {
        self.on_type(LogEvent::PreAdd, action_type, entity_id, Callback::Mutate(listener))
    }

    /// Run `preadd` listeners. The registry lock is released before any
    /// listener runs, so listeners may (un)subscribe.
    pub(crate) fn emit_preadd(&self, action: &Action, meta: &mut Meta) {
        let callbacks = self.lock().collect(LogEvent::PreAdd, action);
        for callback in callbacks {
            match callback {
                Callback::Mutate(listener) => listener(action, &mut *meta),
                Callback::Read(listener) => listener(action, &*meta),
            }
        }
    }

    pub(crate) fn emit(&self, event: LogEvent, action: &Action, meta: &Meta) {
        let callbacks = self.lock().collect(event, action);
        for callback in callbacks {
            if let Callback::Read(listener) = callback {
                listener(action, meta);
            }
        }
    }
}
