//! The Log: in-process façade over a [`LogStore`].
//!
//! The log assigns causal ids, decides whether an action is persisted or
//! only announced, and fires `preadd`/`add`/`clean` notifications.

use std::sync::{Arc, Mutex, PoisonError};

use logsync_core::{
    Action, ActionId, Clock, CoreError, IdGenerator, Meta, MetaDiff, NewMeta, NodeId, SystemClock,
};

use crate::error::LogResult;
use crate::listeners::{Listeners, LogEvent, Subscription};
use crate::traits::{AddResult, Entry, LogStore, PageCursor, Query, RemoveCriteria};

/// What an [`Log::each`] visitor wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// An append-only, reason-counted action log.
///
/// # Lifecycle
///
/// One log per process, built with a store and a stable node id. It outlives
/// the nodes that sync it, and is usually shared as `Arc<Log<S>>`.
pub struct Log<S: LogStore> {
    node_id: NodeId,
    store: S,
    clock: Arc<dyn Clock>,
    ids: Mutex<IdGenerator>,
    listeners: Listeners,
}

impl<S: LogStore> Log<S> {
    /// Create a log reading time from the system clock.
    pub fn new(node_id: NodeId, store: S) -> Self {
        Self::with_clock(node_id, store, Arc::new(SystemClock))
    }

    /// Create a log with a custom clock.
    pub fn with_clock(node_id: NodeId, store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids: Mutex::new(IdGenerator::new(node_id.clone())),
            node_id,
            store,
            clock,
            listeners: Listeners::default(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time from the log's clock.
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Issue a new causal id.
    pub fn generate_id(&self) -> ActionId {
        let now = self.clock.now_millis();
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next(now)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add an action.
    ///
    /// Actions left without reasons after `preadd` are ephemeral: `add` and
    /// `clean` fire but the store is never touched. Returns
    /// [`AddResult::AlreadyPresent`] for a known id, without firing events.
    pub async fn add(&self, action: Action, meta: NewMeta) -> LogResult<AddResult> {
        let new_id = meta.id.is_none();
        let id = match &meta.id {
            Some(id) => id.clone(),
            None => self.generate_id(),
        };
        let mut meta = meta.into_meta(id);

        self.listeners.emit_preadd(&action, &mut meta);

        if let Some(reason) = meta.keep_last.clone() {
            let criteria = RemoveCriteria::new().older_than(meta.clone());
            self.remove_reason(&reason, &criteria).await?;
            meta.add_reason(reason);
        }

        if meta.reasons.is_empty() {
            if !new_id && self.store.by_id(&meta.id).await?.is_some() {
                tracing::trace!(id = %meta.id, "action already in log");
                return Ok(AddResult::AlreadyPresent);
            }
            self.listeners.emit(LogEvent::Add, &action, &meta);
            self.listeners.emit(LogEvent::Clean, &action, &meta);
            return Ok(AddResult::Added(meta));
        }

        match self.store.add(action.clone(), meta).await? {
            AddResult::Added(meta) => {
                self.listeners.emit(LogEvent::Add, &action, &meta);
                Ok(AddResult::Added(meta))
            }
            AddResult::AlreadyPresent => {
                tracing::trace!("action already in log");
                Ok(AddResult::AlreadyPresent)
            }
        }
    }

    /// Visit entries, newest first in the requested order.
    ///
    /// Stops as soon as the visitor returns [`Visit::Stop`].
    pub async fn each<F>(&self, query: &Query, mut visitor: F) -> LogResult<()>
    where
        F: FnMut(&Action, &Meta) -> Visit + Send,
    {
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page = self.store.get(query, cursor).await?;
            for (action, meta) in page.entries.iter().rev() {
                if visitor(action, meta) == Visit::Stop {
                    return Ok(());
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Change mutable meta fields of a stored action.
    ///
    /// Emptying `reasons` removes the action and fires `clean`. Returns
    /// false if the id is unknown.
    pub async fn change_meta(&self, id: &ActionId, diff: &MetaDiff) -> LogResult<bool> {
        if let Some(field) = diff.read_only_field() {
            return Err(CoreError::ReadOnlyField(field.to_string()).into());
        }

        let clears_reasons = match diff.new_reasons() {
            Some(reasons) => reasons?.is_empty(),
            None => false,
        };
        if !clears_reasons {
            return Ok(self.store.change_meta(id, diff).await?);
        }

        // Validate the rest of the diff before anything is removed.
        Meta::new(id.clone()).apply_diff(diff)?;
        match self.store.remove(id).await? {
            Some((action, mut meta)) => {
                meta.apply_diff(diff)?;
                self.listeners.emit(LogEvent::Clean, &action, &meta);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a reason from matching actions, firing `clean` for each action
    /// left without reasons.
    pub async fn remove_reason(&self, reason: &str, criteria: &RemoveCriteria) -> LogResult<()> {
        let listeners = &self.listeners;
        self.store
            .remove_reason(reason, criteria, &mut |action, meta| {
                listeners.emit(LogEvent::Clean, action, meta)
            })
            .await?;
        Ok(())
    }

    /// Get an action by id.
    pub async fn by_id(&self, id: &ActionId) -> LogResult<Option<Entry>> {
        Ok(self.store.by_id(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    /// Listen before the persistence decision; may add reasons or `keep_last`.
    pub fn on_preadd<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Action, &mut Meta) + Send + Sync + 'static,
    {
        self.listeners.on_preadd(Arc::new(listener))
    }

    pub fn on_add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Action, &Meta) + Send + Sync + 'static,
    {
        self.listeners.on(LogEvent::Add, Arc::new(listener))
    }

    pub fn on_clean<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Action, &Meta) + Send + Sync + 'static,
    {
        self.listeners.on(LogEvent::Clean, Arc::new(listener))
    }

    /// Listen to `add` or `clean` of one action type, optionally only for
    /// actions whose `id` field equals `entity_id`.
    ///
    /// Use [`Log::on_type_preadd`] for `preadd`; passing
    /// [`LogEvent::PreAdd`] here registers a read-only preadd listener.
    pub fn on_type<F>(
        &self,
        event: LogEvent,
        action_type: &str,
        entity_id: Option<&str>,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&Action, &Meta) + Send + Sync + 'static,
    {
        self.listeners
            .on_type_read(event, action_type, entity_id, Arc::new(listener))
    }

    pub fn on_type_preadd<F>(
        &self,
        action_type: &str,
        entity_id: Option<&str>,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&Action, &mut Meta) + Send + Sync + 'static,
    {
        self.listeners
            .on_type_preadd(action_type, entity_id, Arc::new(listener))
    }
}
