//! LogStore trait: the abstract interface for action persistence.
//!
//! This trait allows the log to be storage-agnostic. The in-memory
//! implementation in [`crate::memory`] is the reference; browser or on-disk
//! stores live outside this workspace and implement the same contract.

use async_trait::async_trait;
use logsync_core::{is_first_older, Action, ActionId, Meta, MetaDiff};

use crate::error::Result;

/// A logged action with its meta.
pub type Entry = (Action, Meta);

/// Result of adding an action.
#[derive(Debug, Clone, PartialEq)]
pub enum AddResult {
    /// Action was stored (or, in the log, emitted as ephemeral).
    /// Carries the final meta with `added` assigned.
    Added(Meta),
    /// An action with the same id already exists (idempotent - not an error).
    AlreadyPresent,
}

impl AddResult {
    /// The resulting meta, if the action was added.
    pub fn meta(&self) -> Option<&Meta> {
        match self {
            AddResult::Added(meta) => Some(meta),
            AddResult::AlreadyPresent => None,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, AddResult::Added(_))
    }
}

/// Entry ordering for [`LogStore::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Causal order (see [`logsync_core::causal_cmp`]).
    #[default]
    Created,
    /// Store insertion order.
    Added,
}

/// What to read from a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub order: Order,
    /// Restrict to entries carrying this index key.
    pub index: Option<String>,
}

impl Query {
    pub fn created() -> Self {
        Self::default()
    }

    pub fn added() -> Self {
        Self {
            order: Order::Added,
            index: None,
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// Opaque position handed back by a store to fetch the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(pub u64);

/// One page of entries.
///
/// The first page holds the newest entries and `next` walks towards older
/// ones. Inside a page, entries are ordered oldest to newest.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub next: Option<PageCursor>,
}

/// Filter for [`LogStore::remove_reason`].
///
/// All set bounds must hold for an entry to lose the reason. `id` restricts
/// the operation to a single entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoveCriteria {
    pub min_added: Option<u64>,
    pub max_added: Option<u64>,
    pub older_than: Option<Meta>,
    pub younger_than: Option<Meta>,
    pub id: Option<ActionId>,
}

impl RemoveCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_added(mut self, added: u64) -> Self {
        self.min_added = Some(added);
        self
    }

    pub fn max_added(mut self, added: u64) -> Self {
        self.max_added = Some(added);
        self
    }

    pub fn older_than(mut self, meta: Meta) -> Self {
        self.older_than = Some(meta);
        self
    }

    pub fn younger_than(mut self, meta: Meta) -> Self {
        self.younger_than = Some(meta);
        self
    }

    pub fn id(mut self, id: ActionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Check the range bounds against a stored meta.
    pub fn matches(&self, meta: &Meta) -> bool {
        if let Some(id) = &self.id {
            if &meta.id != id {
                return false;
            }
        }
        if let Some(older) = &self.older_than {
            if !is_first_older(Some(meta), Some(older)) {
                return false;
            }
        }
        if let Some(younger) = &self.younger_than {
            if !is_first_older(Some(younger), Some(meta)) {
                return false;
            }
        }
        if self.min_added.is_some_and(|min| meta.added < min) {
            return false;
        }
        if self.max_added.is_some_and(|max| meta.added > max) {
            return false;
        }
        true
    }
}

/// Sync watermarks persisted by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastSynced {
    /// Highest local `added` the peer acknowledged.
    pub sent: u64,
    /// Highest peer `added` we processed.
    pub received: u64,
}

/// Partial update of [`LastSynced`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncedUpdate {
    pub sent: Option<u64>,
    pub received: Option<u64>,
}

impl SyncedUpdate {
    pub fn sent(added: u64) -> Self {
        Self {
            sent: Some(added),
            received: None,
        }
    }

    pub fn received(added: u64) -> Self {
        Self {
            sent: None,
            received: Some(added),
        }
    }
}

/// Callback invoked for every entry that lost its last reason.
pub type RemovedCallback<'a> = dyn FnMut(&Action, &Meta) + Send + 'a;

/// The LogStore trait: async interface for action persistence.
///
/// # Design Notes
///
/// - **Idempotent adds**: adding an existing id returns `AlreadyPresent`.
/// - **Monotonic `added`**: each successful add gets previous max + 1.
/// - **Reason GC**: an entry whose reasons become empty is removed.
/// - Implementations serialize their own mutations.
#[async_trait]
pub trait LogStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add an action. Assigns `added` on success.
    async fn add(&self, action: Action, meta: Meta) -> Result<AddResult>;

    /// Get an entry by causal id.
    async fn by_id(&self, id: &ActionId) -> Result<Option<Entry>>;

    /// Remove an entry, returning it if it existed.
    async fn remove(&self, id: &ActionId) -> Result<Option<Entry>>;

    /// Read a page of entries. Pass `None` for the first (newest) page.
    async fn get(&self, query: &Query, cursor: Option<PageCursor>) -> Result<Page>;

    /// Change mutable meta fields. Returns false if the id is unknown.
    async fn change_meta(&self, id: &ActionId, diff: &MetaDiff) -> Result<bool>;

    /// Remove `reason` from every entry matching `criteria`, dropping
    /// entries left without reasons and reporting each through `on_removed`.
    async fn remove_reason(
        &self,
        reason: &str,
        criteria: &RemoveCriteria,
        on_removed: &mut RemovedCallback<'_>,
    ) -> Result<()>;

    /// Drop everything, including sync watermarks.
    async fn clean(&self) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Watermarks
    // ─────────────────────────────────────────────────────────────────────────

    /// Highest `added` assigned so far.
    async fn get_last_added(&self) -> Result<u64>;

    async fn get_last_synced(&self) -> Result<LastSynced>;

    async fn set_last_synced(&self, update: SyncedUpdate) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(time: i64, added: u64) -> Meta {
        let mut meta = Meta::new(ActionId::new(time, "n", 0));
        meta.added = added;
        meta
    }

    #[test]
    fn test_criteria_added_bounds() {
        let c = RemoveCriteria::new().min_added(2).max_added(3);
        assert!(!c.matches(&meta(1, 1)));
        assert!(c.matches(&meta(1, 2)));
        assert!(c.matches(&meta(1, 3)));
        assert!(!c.matches(&meta(1, 4)));
    }

    #[test]
    fn test_criteria_causal_bounds() {
        let c = RemoveCriteria::new()
            .younger_than(meta(10, 0))
            .older_than(meta(20, 0));
        assert!(!c.matches(&meta(10, 1)));
        assert!(c.matches(&meta(15, 1)));
        assert!(!c.matches(&meta(20, 1)));
    }

    #[test]
    fn test_criteria_id() {
        let target = meta(5, 1);
        let c = RemoveCriteria::new().id(target.id.clone());
        assert!(c.matches(&target));
        assert!(!c.matches(&meta(6, 2)));
    }
}
