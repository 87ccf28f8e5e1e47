//! The `sync`/`synced` exchange.
//!
//! Outgoing batches carry actions oldest first. Incoming batches are
//! decoded, filtered and mapped, then added to the log; hooks for
//! different actions of one batch run concurrently, and `synced` goes out
//! only after every action has been handled.

use std::sync::Arc;

use futures::future::join_all;
use logsync_core::{Action, Meta, NewMeta};
use logsync_log::{AddResult, Entry, Log, LogStore, Query, SyncedUpdate, Visit};

use super::driver::{lock_received, Driver, ReceivedSet};
use super::NodeState;
use crate::config::SyncHooks;
use crate::error::{HookResult, Result};
use crate::messages::{Message, WireMeta};

impl<S: LogStore + 'static> Driver<S> {
    /// Send every action the peer has not acknowledged, as one batch.
    pub(super) async fn sync_since(&mut self, last: u64) -> Result<()> {
        let mut batch: Vec<Entry> = Vec::new();
        self.log
            .each(&Query::added(), |action, meta| {
                if meta.added <= last {
                    return Visit::Stop;
                }
                batch.push((action.clone(), meta.clone()));
                Visit::Continue
            })
            .await?;
        batch.reverse();

        let added = batch.iter().map(|(_, meta)| meta.added).max().unwrap_or(last);
        self.synced_through = self.synced_through.max(added);

        let batch = self.outgoing(batch).await?;
        if batch.is_empty() {
            if self.status.connected {
                self.set_state(NodeState::Synchronized);
            }
            return Ok(());
        }
        self.send_sync(added, batch)
    }

    /// Forward a local addition to the peer.
    pub(super) async fn on_log_add(&mut self, action: Action, meta: Meta) -> Result<()> {
        self.last_added_cache = self.last_added_cache.max(meta.added);
        if lock_received(&self.received).remove(&meta.id) {
            return Ok(());
        }
        if !self.status.authenticated {
            return Ok(());
        }
        if meta.added != 0 && meta.added <= self.synced_through {
            // Already part of a `sync_since` batch.
            return Ok(());
        }
        let added = meta.added;
        let batch = self.outgoing(vec![(action, meta)]).await?;
        if batch.is_empty() {
            return Ok(());
        }
        self.send_sync(added, batch)
    }

    fn send_sync(&mut self, added: u64, entries: Vec<Entry>) -> Result<()> {
        self.start_timeout();
        self.status.syncing += 1;
        self.set_state(NodeState::Sending);

        let codec = self.codec();
        let entries = entries
            .into_iter()
            .map(|(action, meta)| (action, codec.encode(&meta)))
            .collect();
        self.send(Message::Sync { added, entries })
    }

    /// Apply `out_filter` and `out_map`. Order is preserved.
    async fn outgoing(&mut self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        let Some(hooks) = self.hooks.sync.clone() else {
            return Ok(entries);
        };
        let results = join_all(entries.into_iter().map(|(action, meta)| {
            let hooks = Arc::clone(&hooks);
            async move {
                match hooks.out_filter(&action, &meta).await {
                    Ok(true) => hooks.out_map(action, meta).await.map(Some),
                    Ok(false) => Ok(None),
                    Err(err) => Err(err),
                }
            }
        }))
        .await;

        let mut batch = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(Some(entry)) => batch.push(entry),
                Ok(None) => {}
                Err(err) => self.raise(err.into())?,
            }
        }
        Ok(batch)
    }

    pub(super) async fn on_sync_message(
        &mut self,
        added: u64,
        entries: Vec<(Action, WireMeta)>,
    ) -> Result<()> {
        let codec = self.codec();
        let mut decoded = Vec::with_capacity(entries.len());
        for (action, wire) in entries {
            match codec.decode(&wire) {
                Ok(meta) => decoded.push((action, meta)),
                Err(kind) => {
                    self.send_error(kind)?;
                    self.connection.disconnect(Some("error"));
                    return Ok(());
                }
            }
        }
        tracing::trace!(added, count = decoded.len(), "received sync batch");

        let log = Arc::clone(&self.log);
        let hooks = self.hooks.sync.clone();
        let received = Arc::clone(&self.received);
        let results = join_all(decoded.into_iter().map(|(action, meta)| {
            receive(
                Arc::clone(&log),
                hooks.clone(),
                Arc::clone(&received),
                action,
                meta,
            )
        }))
        .await;

        if added > self.last_received {
            self.last_received = added;
            self.log
                .store()
                .set_last_synced(SyncedUpdate::received(added))
                .await?;
        }
        self.send(Message::Synced(added))?;

        for result in results {
            if let Err(err) = result {
                self.raise(err)?;
            }
        }
        Ok(())
    }

    pub(super) async fn on_synced_message(&mut self, added: u64) -> Result<()> {
        self.end_timeout();
        if added > self.last_sent {
            self.last_sent = added;
            self.log
                .store()
                .set_last_synced(SyncedUpdate::sent(added))
                .await?;
        }
        self.status.syncing = self.status.syncing.saturating_sub(1);
        if self.status.syncing == 0 {
            self.set_state(NodeState::Synchronized);
        }
        Ok(())
    }
}

/// Filter, map and add one received action.
async fn receive<S: LogStore>(
    log: Arc<Log<S>>,
    hooks: Option<Arc<dyn SyncHooks>>,
    received: ReceivedSet,
    action: Action,
    meta: Meta,
) -> Result<()> {
    let (action, meta) = match hooks {
        Some(hooks) => match incoming(hooks.as_ref(), action, meta).await? {
            Some(entry) => entry,
            None => return Ok(()),
        },
        None => (action, meta),
    };

    let id = meta.id.clone();
    lock_received(&received).insert(id.clone());
    let result = log.add(action, NewMeta::from(meta)).await;
    if !matches!(result, Ok(AddResult::Added(_))) {
        lock_received(&received).remove(&id);
    }
    result?;
    Ok(())
}

async fn incoming(hooks: &dyn SyncHooks, action: Action, meta: Meta) -> HookResult<Option<Entry>> {
    if !hooks.in_filter(&action, &meta).await? {
        return Ok(None);
    }
    hooks.in_map(action, meta).await.map(Some)
}
