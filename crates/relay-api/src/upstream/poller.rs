//! The polling requestor used by the stream client to resolve
//! `indirect/patch`/`indirect/put` events, and by the downstream
//! `PollingHandler` to serve one-shot snapshot requests.

use relay_core::{Kind, RelayError, Result, Snapshot, VersionedItem};
use reqwest::Client;
use serde_json::Value;

/// Thin wrapper around the upstream polling endpoint
/// (`GET {pollBase}/sdk/latest-all`), shared by the stream client's
/// indirect-event resolution and the downstream polling handler.
#[derive(Clone)]
pub struct PollRequestor {
    client: Client,
    poll_uri: String,
    sdk_key: String,
}

impl PollRequestor {
    pub fn new(client: Client, poll_uri: impl Into<String>, sdk_key: impl Into<String>) -> Self {
        Self { client, poll_uri: poll_uri.into(), sdk_key: sdk_key.into() }
    }

    /// Fetch the full upstream snapshot.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let url = format!("{}/sdk/latest-all", self.poll_uri.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.sdk_key)
            .send()
            .await?
            .error_for_status()?;
        let value: Value = response.json().await?;
        snapshot_from_value(value)
    }

    /// Fetch just the single item named by an `indirect/patch` path, by
    /// requesting the full snapshot and extracting it. Returns `None` if
    /// the item is absent from the upstream snapshot (already deleted).
    pub async fn fetch_item(&self, path: &str) -> Result<Option<VersionedItem>> {
        let (kind, key) = Kind::from_path(path).ok_or_else(|| RelayError::MalformedPayload {
            message: format!("unrecognized indirect-patch path: {}", path),
        })?;
        let snapshot = self.fetch_snapshot().await?;
        Ok(snapshot.get(&kind).and_then(|bucket| bucket.get(&key)).cloned())
    }
}

fn snapshot_from_value(value: Value) -> Result<Snapshot> {
    let mut snapshot = relay_core::model::empty_snapshot();
    for kind in Kind::all() {
        let Some(items) = value.get(kind.namespace()).and_then(|v| v.as_object()) else {
            continue;
        };
        let bucket = snapshot.get_mut(&kind).expect("empty_snapshot populates every kind");
        for (key, item_value) in items {
            let version = item_value.get("version").and_then(|v| v.as_i64()).ok_or_else(|| {
                RelayError::MalformedPayload { message: format!("{} missing version", key) }
            })?;
            bucket.insert(key.clone(), VersionedItem::live(key.clone(), version, item_value.to_string().into_bytes()));
        }
    }
    Ok(snapshot)
}
