//! In-memory implementation of the LogStore trait.
//!
//! This is the reference store. It keeps everything in memory with no
//! persistence, so it is what tests and short-lived processes use.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use logsync_core::{causal_cmp, Action, ActionId, Meta, MetaDiff};

use crate::error::Result;
use crate::traits::{
    AddResult, Entry, LastSynced, LogStore, Order, Page, PageCursor, Query, RemoveCriteria,
    RemovedCallback, SyncedUpdate,
};

/// In-memory store implementation.
///
/// Keeps two orderings side by side: ids sorted causally (insertion sort on
/// every add) and ids keyed by their `added` sequence.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    page_size: Option<usize>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Entries indexed by id.
    entries: HashMap<ActionId, Entry>,

    /// Ids in causal order, oldest first.
    created: Vec<ActionId>,

    /// Ids by `added` sequence.
    added: BTreeMap<u64, ActionId>,

    last_added: u64,
    last_synced: LastSynced,
}

impl MemoryStore {
    /// Create a new empty in-memory store that returns everything in one page.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            page_size: None,
        }
    }

    /// Create a store that splits `get` results into pages of `size` entries.
    pub fn with_page_size(size: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            page_size: Some(size.max(1)),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn detach(&mut self, id: &ActionId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.created.retain(|other| other != id);
        self.added.remove(&entry.1.added);
        Some(entry)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn add(&self, action: Action, mut meta: Meta) -> Result<AddResult> {
        let mut guard = self.write();
        let inner = &mut *guard;

        if inner.entries.contains_key(&meta.id) {
            return Ok(AddResult::AlreadyPresent);
        }

        // Insertion sort: place after every entry that is not younger.
        let entries = &inner.entries;
        let position = inner.created.partition_point(|id| {
            entries
                .get(id)
                .is_some_and(|(_, other)| causal_cmp(other, &meta).is_le())
        });

        inner.last_added += 1;
        meta.added = inner.last_added;

        inner.created.insert(position, meta.id.clone());
        inner.added.insert(meta.added, meta.id.clone());
        inner
            .entries
            .insert(meta.id.clone(), (action, meta.clone()));

        Ok(AddResult::Added(meta))
    }

    async fn by_id(&self, id: &ActionId) -> Result<Option<Entry>> {
        Ok(self.read().entries.get(id).cloned())
    }

    async fn remove(&self, id: &ActionId) -> Result<Option<Entry>> {
        Ok(self.write().detach(id))
    }

    async fn get(&self, query: &Query, cursor: Option<PageCursor>) -> Result<Page> {
        let inner = self.read();

        let ids: Vec<&ActionId> = match query.order {
            Order::Created => inner.created.iter().collect(),
            Order::Added => inner.added.values().collect(),
        };
        let ordered: Vec<&Entry> = ids
            .into_iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|(_, meta)| match &query.index {
                Some(index) => meta.has_index(index),
                None => true,
            })
            .collect();

        // Cursor counts entries already returned from the newest end.
        let skipped = cursor.map_or(0, |c| c.0 as usize).min(ordered.len());
        let end = ordered.len() - skipped;
        let start = match self.page_size {
            Some(size) => end.saturating_sub(size),
            None => 0,
        };

        Ok(Page {
            entries: ordered[start..end].iter().map(|e| (*e).clone()).collect(),
            next: (start > 0).then(|| PageCursor((skipped + end - start) as u64)),
        })
    }

    async fn change_meta(&self, id: &ActionId, diff: &MetaDiff) -> Result<bool> {
        let mut inner = self.write();
        match inner.entries.get_mut(id) {
            Some((_, meta)) => {
                meta.apply_diff(diff)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_reason(
        &self,
        reason: &str,
        criteria: &RemoveCriteria,
        on_removed: &mut RemovedCallback<'_>,
    ) -> Result<()> {
        let removed = {
            let mut guard = self.write();
            let inner = &mut *guard;

            let candidates: Vec<ActionId> = match &criteria.id {
                Some(id) => vec![id.clone()],
                None => inner.created.clone(),
            };

            let mut emptied = Vec::new();
            for id in candidates {
                let Some((_, meta)) = inner.entries.get_mut(&id) else {
                    continue;
                };
                if !meta.has_reason(reason) || !criteria.matches(meta) {
                    continue;
                }
                meta.remove_reason(reason);
                if meta.reasons.is_empty() {
                    emptied.push(id);
                }
            }

            emptied
                .iter()
                .filter_map(|id| inner.detach(id))
                .collect::<Vec<Entry>>()
        };

        // Callbacks run without the lock held.
        for (action, meta) in &removed {
            on_removed(action, meta);
        }
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        *self.write() = MemoryStoreInner::default();
        Ok(())
    }

    async fn get_last_added(&self) -> Result<u64> {
        Ok(self.read().last_added)
    }

    async fn get_last_synced(&self) -> Result<LastSynced> {
        Ok(self.read().last_synced)
    }

    async fn set_last_synced(&self, update: SyncedUpdate) -> Result<()> {
        let mut inner = self.write();
        if let Some(sent) = update.sent {
            inner.last_synced.sent = sent;
        }
        if let Some(received) = update.received {
            inner.last_synced.received = received;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: i64, node: &str, reasons: &[&str]) -> (Action, Meta) {
        let mut meta = Meta::new(ActionId::new(time, node, 0));
        meta.reasons = reasons.iter().map(|r| r.to_string()).collect();
        (Action::new("test"), meta)
    }

    async fn times(store: &MemoryStore, query: &Query) -> Vec<i64> {
        let page = store.get(query, None).await.unwrap();
        page.entries.iter().map(|(_, m)| m.id.time).collect()
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let (action, meta) = entry(1, "a", &["test"]);
        let id = meta.id.clone();

        let result = store.add(action, meta).await.unwrap();
        assert_eq!(result.meta().map(|m| m.added), Some(1));

        let (_, stored) = store.by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.added, 1);
        assert_eq!(store.get_last_added().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_idempotent() {
        let store = MemoryStore::new();
        let (action, meta) = entry(1, "a", &["test"]);

        let r1 = store.add(action.clone(), meta.clone()).await.unwrap();
        assert!(r1.is_added());

        let r2 = store.add(action, meta).await.unwrap();
        assert_eq!(r2, AddResult::AlreadyPresent);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_last_added().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_created_and_added_orders() {
        let store = MemoryStore::new();
        for time in [3, 1, 2] {
            let (action, meta) = entry(time, "a", &["r"]);
            store.add(action, meta).await.unwrap();
        }

        assert_eq!(times(&store, &Query::created()).await, vec![1, 2, 3]);
        assert_eq!(times(&store, &Query::added()).await, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_index_query_keeps_order() {
        let store = MemoryStore::new();
        for (time, indexed) in [(3, true), (1, true), (2, false)] {
            let (action, mut meta) = entry(time, "a", &["r"]);
            if indexed {
                meta.indexes.push("users".into());
            }
            store.add(action, meta).await.unwrap();
        }

        assert_eq!(
            times(&store, &Query::created().index("users")).await,
            vec![1, 3]
        );
        assert_eq!(
            times(&store, &Query::added().index("users")).await,
            vec![3, 1]
        );
    }

    #[tokio::test]
    async fn test_paging_walks_from_newest() {
        let store = MemoryStore::with_page_size(2);
        for time in 1..=5 {
            let (action, meta) = entry(time, "a", &["r"]);
            store.add(action, meta).await.unwrap();
        }

        let mut pages = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.get(&Query::created(), cursor).await.unwrap();
            pages.push(page.entries.iter().map(|(_, m)| m.id.time).collect::<Vec<_>>());
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(pages, vec![vec![4, 5], vec![2, 3], vec![1]]);
    }

    #[tokio::test]
    async fn test_remove_reason_drops_empty_entries() {
        let store = MemoryStore::new();
        for (time, reasons) in [(1, vec!["a"]), (2, vec!["a", "b"]), (3, vec!["b"])] {
            let (action, meta) = entry(time, "n", &reasons);
            store.add(action, meta).await.unwrap();
        }

        let mut removed = Vec::new();
        store
            .remove_reason("a", &RemoveCriteria::new(), &mut |_, meta| {
                removed.push(meta.id.time)
            })
            .await
            .unwrap();

        assert_eq!(removed, vec![1]);
        assert_eq!(times(&store, &Query::created()).await, vec![2, 3]);
        assert_eq!(times(&store, &Query::added()).await, vec![2, 3]);
        let (_, meta) = store
            .by_id(&ActionId::new(2, "n", 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.reasons, vec!["b"]);
    }

    #[tokio::test]
    async fn test_remove_reason_by_id() {
        let store = MemoryStore::new();
        for time in [1, 2] {
            let (action, meta) = entry(time, "n", &["a"]);
            store.add(action, meta).await.unwrap();
        }

        let criteria = RemoveCriteria::new().id(ActionId::new(2, "n", 0));
        store
            .remove_reason("a", &criteria, &mut |_, _| {})
            .await
            .unwrap();
        assert_eq!(times(&store, &Query::created()).await, vec![1]);
    }

    #[tokio::test]
    async fn test_last_synced_and_clean() {
        let store = MemoryStore::new();
        store.set_last_synced(SyncedUpdate::sent(3)).await.unwrap();
        store.set_last_synced(SyncedUpdate::received(5)).await.unwrap();
        assert_eq!(
            store.get_last_synced().await.unwrap(),
            LastSynced { sent: 3, received: 5 }
        );

        let (action, meta) = entry(1, "n", &["a"]);
        store.add(action, meta).await.unwrap();
        store.clean().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get_last_added().await.unwrap(), 0);
        assert_eq!(store.get_last_synced().await.unwrap(), LastSynced::default());
    }
}
