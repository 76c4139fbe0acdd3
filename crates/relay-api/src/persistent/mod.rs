//! The optional persistent cache fronting the in-memory [`VersionedStore`].
//!
//! A [`PersistentAdapter`] mirrors every store mutation to a backing store
//! (currently Redis; Consul/DynamoDB are out of scope for this build but
//! would implement the same trait) so a restarted relay can warm its store
//! without waiting for a full upstream resync. The adapter is read-through:
//! a miss on the TTL cache falls back to the backing store.

#[cfg(feature = "redis-backend")]
pub mod redis;

use async_trait::async_trait;
use relay_core::{Kind, Result, Snapshot, VersionedItem};

/// Contract a concrete persistent backend implements. Mirrors
/// [`relay_core::VersionedStore`]'s operations plus availability reporting,
/// since a backend outage must be distinguishable from "not yet
/// initialized".
#[async_trait]
pub trait PersistentAdapter: Send + Sync {
    /// Replace the backing store's contents for every kind with `snapshot`,
    /// and warm the TTL cache from it.
    async fn init(&self, snapshot: &Snapshot) -> Result<()>;

    /// Read-through get: cache hit returns immediately; cache miss reads the
    /// backing store and populates the cache.
    async fn get(&self, kind: Kind, key: &str) -> Result<Option<VersionedItem>>;

    /// Read-through get-all for a kind, tombstones excluded.
    async fn get_all(&self, kind: Kind) -> Result<Vec<VersionedItem>>;

    /// Apply a version-wins upsert against the backing store's current
    /// version (not the cached one), then update the cache on success.
    async fn upsert(&self, kind: Kind, item: VersionedItem) -> Result<bool>;

    /// Apply a version-wins tombstone write.
    async fn delete(&self, kind: Kind, key: &str, version: i64) -> Result<bool>;

    /// Whether `init` has completed at least once.
    fn is_initialized(&self) -> bool;

    /// Whether the backing store was reachable as of the last operation.
    /// Distinct from `is_initialized`: a backend can be unavailable after
    /// having initialized successfully in the past.
    fn is_available(&self) -> bool;
}

/// A no-op adapter used when no persistent backend is configured; the
/// in-memory [`relay_core::VersionedStore`] is authoritative and this type
/// is never constructed into the Supervisor's adapter slot.
pub struct NoopAdapter;

#[async_trait]
impl PersistentAdapter for NoopAdapter {
    async fn init(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _kind: Kind, _key: &str) -> Result<Option<VersionedItem>> {
        Ok(None)
    }

    async fn get_all(&self, _kind: Kind) -> Result<Vec<VersionedItem>> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _kind: Kind, _item: VersionedItem) -> Result<bool> {
        Ok(true)
    }

    async fn delete(&self, _kind: Kind, _key: &str, _version: i64) -> Result<bool> {
        Ok(true)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        true
    }
}
