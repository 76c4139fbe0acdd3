//! Test fixtures shared across `relay-core`'s own test modules and, via the
//! `testing` feature, `relay-api`'s.

use crate::config::{
    EnvironmentConfig, EventRelayConfig, ListenConfig, PersistentBackend, PersistentStoreConfig,
    RelayConfig, UpstreamConfig,
};
use crate::model::{Kind, Snapshot, VersionedItem};
use std::collections::HashMap;
use std::time::Duration;

/// A minimal valid [`RelayConfig`] for one environment, suitable as a
/// starting point for tests that only need to tweak a handful of fields.
pub fn test_config() -> RelayConfig {
    RelayConfig {
        listen: ListenConfig { host: "127.0.0.1".to_string(), port: 8030 },
        upstream: UpstreamConfig {
            stream_uri: "https://stream.launchdarkly.com".to_string(),
            poll_uri: "https://sdk.launchdarkly.com".to_string(),
            events_uri: "https://events.launchdarkly.com".to_string(),
            heartbeat_interval: Duration::from_secs(180),
        },
        events: EventRelayConfig {
            capacity: 100,
            flush_interval: Duration::from_millis(50),
            sampling_interval: 0,
            send_events: true,
        },
        persistent_store: PersistentStoreConfig {
            backend: PersistentBackend::None,
            url: None,
            ttl: Duration::from_secs(60),
            prefix: "relay-test".to_string(),
        },
        environments: vec![EnvironmentConfig {
            name: "test".to_string(),
            sdk_key: "test-sdk-key".to_string(),
            mobile_key: Some("test-mobile-key".to_string()),
            env_id: Some("test-env-id".to_string()),
        }],
    }
}

/// Build a one-flag snapshot, handy for seeding a `VersionedStore` in tests
/// that exercise the downstream catch-up path.
pub fn snapshot_with_flag(key: &str, version: i64, payload: &str) -> Snapshot {
    let mut snapshot = crate::model::empty_snapshot();
    snapshot
        .get_mut(&Kind::Flags)
        .expect("empty_snapshot populates every kind")
        .insert(key.to_string(), VersionedItem::live(key, version, payload.as_bytes().to_vec()));
    snapshot
}

/// Build an empty snapshot with one entry per kind, useful for asserting a
/// freshly-`init`ed store is otherwise untouched.
pub fn empty_snapshot_map() -> HashMap<Kind, HashMap<String, VersionedItem>> {
    crate::model::empty_snapshot()
}
