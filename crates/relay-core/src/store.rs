//! The in-memory authoritative store of flag/segment data for one
//! environment.
//!
//! One [`VersionedStore`] is owned by each environment's Supervisor. It is
//! the single writer target for both the `UpstreamStreamClient` (put/patch/
//! delete) and the optional `PersistentAdapter` read-through-on-init path;
//! every downstream read (SSE catch-up, polling, eval endpoints) is served
//! from it directly.

use crate::error::{RelayError, Result};
use crate::model::{empty_snapshot, Kind, Snapshot, VersionedItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What changed as the result of an `upsert`/`delete` call, so callers
/// (the Broadcaster) can decide whether a downstream fan-out is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The item did not exist, or existed at a lower version; the store was
    /// updated and subscribers should be notified.
    Applied,
    /// The incoming version was not newer than what the store already has;
    /// the write was a no-op per the last-writer-wins-by-version rule.
    Stale,
}

impl WriteOutcome {
    /// Convenience for callers (the stream client, the `PersistentAdapter`)
    /// that only care whether a downstream fan-out is warranted.
    pub fn applied(self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Thread-safe, per-kind versioned store. Each `Kind` gets its own lock so a
/// flag write never blocks a segment read.
pub struct VersionedStore {
    data: HashMap<Kind, RwLock<HashMap<String, VersionedItem>>>,
    initialized: AtomicBool,
}

impl VersionedStore {
    /// Build an empty, uninitialized store.
    pub fn new() -> Self {
        Self {
            data: Kind::all().into_iter().map(|k| (k, RwLock::new(HashMap::new()))).collect(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Replace the entire store contents atomically-per-kind with a full
    /// snapshot (the upstream `put` event, or a `PersistentAdapter` read on
    /// cold start). Marks the store initialized so downstream reads are
    /// accepted.
    pub async fn init(&self, snapshot: Snapshot) {
        for kind in Kind::all() {
            let items = snapshot.get(&kind).cloned().unwrap_or_default();
            let mut guard = self.data[&kind].write().await;
            *guard = items;
        }
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Whether `init` has been called at least once. Downstream handlers
    /// must not serve a catch-up snapshot, and the polling/eval endpoints
    /// must return 503, until this is true.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Fetch a single *live* item by kind and key — `None` for both absent
    /// keys and tombstones, per spec.md §4.1's `get(kind, key) → VersionedItem
    /// | none`.
    pub async fn get(&self, kind: Kind, key: &str) -> Option<VersionedItem> {
        self.get_raw(kind, key).await.filter(|item| !item.deleted)
    }

    /// Fetch a single item by kind and key, including tombstones. Internal
    /// accessor for callers (the stream client's stale-patch check, tests)
    /// that need to see a tombstone rather than have it collapse to `None`.
    pub async fn get_raw(&self, kind: Kind, key: &str) -> Option<VersionedItem> {
        self.data[&kind].read().await.get(key).cloned()
    }

    /// Snapshot of every live (non-tombstone) item across all kinds, the
    /// shape served as the `put` event and the polling-endpoint body.
    pub async fn get_all(&self) -> Snapshot {
        let mut snapshot = empty_snapshot();
        for kind in Kind::all() {
            let guard = self.data[&kind].read().await;
            let live: HashMap<String, VersionedItem> = guard
                .iter()
                .filter(|(_, item)| !item.deleted)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            snapshot.insert(kind, live);
        }
        snapshot
    }

    /// Apply an upstream `patch` (or the live half of an `indirect-patch`
    /// after the indirect fetch resolves). Last-writer-wins by version: a
    /// patch whose version is not strictly greater than the stored version
    /// is dropped as [`WriteOutcome::Stale`] — this also protects a
    /// tombstone from being resurrected by a late, lower-version patch.
    pub async fn upsert(&self, kind: Kind, item: VersionedItem) -> Result<WriteOutcome> {
        let mut guard = self.data[&kind].write().await;
        match guard.get(&item.key) {
            Some(existing) if existing.version >= item.version => Ok(WriteOutcome::Stale),
            _ => {
                guard.insert(item.key.clone(), item);
                Ok(WriteOutcome::Applied)
            }
        }
    }

    /// Apply an upstream `delete`: writes a tombstone at `version` unless a
    /// newer version is already stored.
    pub async fn delete(&self, kind: Kind, key: &str, version: i64) -> Result<WriteOutcome> {
        let mut guard = self.data[&kind].write().await;
        match guard.get(key) {
            Some(existing) if existing.version >= version => Ok(WriteOutcome::Stale),
            _ => {
                guard.insert(key.to_string(), VersionedItem::tombstone(key, version));
                Ok(WriteOutcome::Applied)
            }
        }
    }

    /// Number of live items tracked for a kind, used by the `/status`
    /// endpoint and tests.
    pub async fn len(&self, kind: Kind) -> usize {
        self.data[&kind].read().await.values().filter(|i| !i.deleted).count()
    }
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper used throughout `relay-api`: a store behind an `Arc`
/// so the Supervisor, the stream client, and every HTTP handler share the
/// same instance without a surrounding lock.
pub type SharedStore = Arc<VersionedStore>;

/// Build a fresh [`SharedStore`].
pub fn shared_store() -> SharedStore {
    Arc::new(VersionedStore::new())
}

/// Apply an upstream SSE event's path+item to the store, translating the
/// namespace in `path` into a [`Kind`]. Returns [`RelayError::MalformedPayload`]
/// if the path does not match a known namespace, matching the error taxonomy
/// the `UpstreamStreamClient` surfaces for an unparseable frame.
pub async fn apply_patch(store: &VersionedStore, path: &str, item_json: &[u8], version: i64) -> Result<WriteOutcome> {
    let (kind, key) = Kind::from_path(path).ok_or_else(|| RelayError::MalformedPayload {
        message: format!("unrecognized path: {}", path),
    })?;
    let item = VersionedItem::live(key, version, item_json.to_vec());
    store.upsert(kind, item).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionedItem;

    fn item(key: &str, version: i64) -> VersionedItem {
        VersionedItem::live(key, version, br#"{"on":true}"#.to_vec())
    }

    #[tokio::test]
    async fn reads_are_rejected_before_init() {
        let store = VersionedStore::new();
        assert!(!store.is_initialized());
        assert!(store.get(Kind::Flags, "f1").await.is_none());
    }

    #[tokio::test]
    async fn init_replaces_contents_and_marks_initialized() {
        let store = VersionedStore::new();
        let mut snapshot = empty_snapshot();
        snapshot.get_mut(&Kind::Flags).unwrap().insert("f1".to_string(), item("f1", 1));
        store.init(snapshot).await;
        assert!(store.is_initialized());
        assert_eq!(store.get(Kind::Flags, "f1").await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn upsert_applies_strictly_newer_version() {
        let store = VersionedStore::new();
        assert_eq!(store.upsert(Kind::Flags, item("f1", 1)).await.unwrap(), WriteOutcome::Applied);
        assert_eq!(store.upsert(Kind::Flags, item("f1", 2)).await.unwrap(), WriteOutcome::Applied);
        assert_eq!(store.get(Kind::Flags, "f1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn upsert_drops_stale_version() {
        let store = VersionedStore::new();
        store.upsert(Kind::Flags, item("f1", 5)).await.unwrap();
        assert_eq!(store.upsert(Kind::Flags, item("f1", 3)).await.unwrap(), WriteOutcome::Stale);
        assert_eq!(store.get(Kind::Flags, "f1").await.unwrap().version, 5);
    }

    #[tokio::test]
    async fn delete_tombstones_and_cannot_be_resurrected_by_stale_patch() {
        let store = VersionedStore::new();
        store.upsert(Kind::Flags, item("f1", 1)).await.unwrap();
        assert_eq!(store.delete(Kind::Flags, "f1", 2).await.unwrap(), WriteOutcome::Applied);
        assert!(store.get_raw(Kind::Flags, "f1").await.unwrap().deleted);
        assert_eq!(store.upsert(Kind::Flags, item("f1", 2)).await.unwrap(), WriteOutcome::Stale);
        assert!(store.get(Kind::Flags, "f1").await.is_none());
    }

    #[tokio::test]
    async fn get_all_excludes_tombstones() {
        let store = VersionedStore::new();
        store.upsert(Kind::Flags, item("f1", 1)).await.unwrap();
        store.upsert(Kind::Flags, item("f2", 1)).await.unwrap();
        store.delete(Kind::Flags, "f2", 2).await.unwrap();
        let snapshot = store.get_all().await;
        assert_eq!(snapshot[&Kind::Flags].len(), 1);
        assert!(snapshot[&Kind::Flags].contains_key("f1"));
    }

    #[tokio::test]
    async fn apply_patch_parses_path_into_kind_and_key() {
        let store = VersionedStore::new();
        apply_patch(&store, "/flags/f1", br#"{"on":true}"#, 1).await.unwrap();
        assert!(store.get(Kind::Flags, "f1").await.is_some());

        let err = apply_patch(&store, "/bogus/f1", b"{}", 1).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload { .. }));
    }
}
