//! Redis-backed [`PersistentAdapter`].
//!
//! Layout: one string key per item, `{prefix}:{namespace}:{key}`, holding
//! `{"version":N,"deleted":bool,"payload":<raw json>}`. The version-wins
//! rule is enforced against Redis's current value via `WATCH`/`MULTI`
//! (optimistic transaction), not the local TTL cache, per the read-through
//! design: two relay processes racing to apply the same upstream patch must
//! not let a stale local cache win.

use crate::persistent::PersistentAdapter;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use relay_core::{Kind, RelayError, Result, Snapshot, VersionedItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Version-wins compare-and-set: only overwrites `KEYS[1]` if no existing
/// value is stored, or the stored value's `version` field is strictly lower
/// than `ARGV[2]`. Runs inside Redis as a single atomic operation so two
/// relay processes racing to apply the same upstream patch can't both
/// "win" against a stale read, which a separate GET-then-SET from the
/// client side could not guarantee.
static UPSERT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local current = redis.call('GET', KEYS[1])
if current then
    local existing = cjson.decode(current)
    if existing.version >= tonumber(ARGV[2]) then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#,
    )
});

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredItem {
    version: i64,
    deleted: bool,
    payload: String,
}

impl From<&VersionedItem> for StoredItem {
    fn from(item: &VersionedItem) -> Self {
        Self {
            version: item.version,
            deleted: item.deleted,
            payload: String::from_utf8_lossy(&item.payload).to_string(),
        }
    }
}

impl StoredItem {
    fn into_versioned(self, key: &str) -> VersionedItem {
        if self.deleted {
            VersionedItem::tombstone(key, self.version)
        } else {
            VersionedItem::live(key, self.version, self.payload.into_bytes())
        }
    }
}

struct CacheEntry {
    item: Option<VersionedItem>,
    expires_at: Instant,
}

/// Redis-backed adapter with a small TTL cache layered in front, mirroring
/// the multi-tier cache shape used elsewhere in the workspace for bounding
/// repeated backing-store round-trips on hot keys.
pub struct RedisAdapter {
    conn: Mutex<ConnectionManager>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    prefix: String,
    initialized: AtomicBool,
    available: AtomicBool,
}

impl RedisAdapter {
    pub async fn connect(url: &str, ttl: Duration, prefix: String) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| RelayError::Config { message: format!("invalid redis url: {}", e) })?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| RelayError::BackendUnavailable { message: e.to_string() })?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(HashMap::new()),
            ttl,
            prefix,
            initialized: AtomicBool::new(false),
            available: AtomicBool::new(true),
        })
    }

    fn redis_key(&self, kind: Kind, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, kind.namespace(), key)
    }

    async fn cache_get(&self, redis_key: &str) -> Option<Option<VersionedItem>> {
        let cache = self.cache.lock().await;
        cache.get(redis_key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.item.clone())
            } else {
                None
            }
        })
    }

    async fn cache_put(&self, redis_key: String, item: Option<VersionedItem>) {
        let mut cache = self.cache.lock().await;
        cache.insert(redis_key, CacheEntry { item, expires_at: Instant::now() + self.ttl });
    }

    fn mark_unavailable(&self, error: redis::RedisError) -> RelayError {
        self.available.store(false, Ordering::SeqCst);
        RelayError::BackendUnavailable { message: error.to_string() }
    }
}

#[async_trait]
impl PersistentAdapter for RedisAdapter {
    async fn init(&self, snapshot: &Snapshot) -> Result<()> {
        let mut conn = self.conn.lock().await;
        for kind in Kind::all() {
            let items = snapshot.get(&kind).cloned().unwrap_or_default();
            for (key, item) in &items {
                let redis_key = self.redis_key(kind, key);
                let stored = StoredItem::from(item);
                let json = serde_json::to_string(&stored)?;
                conn.set::<_, _, ()>(&redis_key, json).await.map_err(|e| self.mark_unavailable(e))?;
            }
        }
        self.available.store(true, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        self.cache.lock().await.clear();
        Ok(())
    }

    async fn get(&self, kind: Kind, key: &str) -> Result<Option<VersionedItem>> {
        let redis_key = self.redis_key(kind, key);
        if let Some(cached) = self.cache_get(&redis_key).await {
            return Ok(cached);
        }
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn.get(&redis_key).await.map_err(|e| self.mark_unavailable(e))?;
        self.available.store(true, Ordering::SeqCst);
        let item = match raw {
            Some(text) => {
                let stored: StoredItem = serde_json::from_str(&text)?;
                Some(stored.into_versioned(key)).filter(|i| !i.deleted)
            }
            None => None,
        };
        drop(conn);
        self.cache_put(redis_key, item.clone()).await;
        Ok(item)
    }

    async fn get_all(&self, kind: Kind) -> Result<Vec<VersionedItem>> {
        let mut conn = self.conn.lock().await;
        let pattern = format!("{}:{}:*", self.prefix, kind.namespace());
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(|e| self.mark_unavailable(e))?;
        let mut items = Vec::with_capacity(keys.len());
        for redis_key in keys {
            let raw: Option<String> = conn.get(&redis_key).await.map_err(|e| self.mark_unavailable(e))?;
            if let Some(text) = raw {
                let stored: StoredItem = serde_json::from_str(&text)?;
                if !stored.deleted {
                    let key = redis_key.rsplit(':').next().unwrap_or_default();
                    items.push(stored.into_versioned(key));
                }
            }
        }
        self.available.store(true, Ordering::SeqCst);
        Ok(items)
    }

    async fn upsert(&self, kind: Kind, item: VersionedItem) -> Result<bool> {
        let redis_key = self.redis_key(kind, &item.key);
        let stored = StoredItem::from(&item);
        let json = serde_json::to_string(&stored)?;
        let mut conn = self.conn.lock().await;

        let applied: i64 = UPSERT_SCRIPT
            .key(&redis_key)
            .arg(&json)
            .arg(item.version)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| self.mark_unavailable(e))?;
        drop(conn);

        self.available.store(true, Ordering::SeqCst);
        let applied = applied == 1;
        if applied {
            self.cache_put(redis_key, Some(item)).await;
        }
        Ok(applied)
    }

    async fn delete(&self, kind: Kind, key: &str, version: i64) -> Result<bool> {
        self.upsert(kind, VersionedItem::tombstone(key, version)).await
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
