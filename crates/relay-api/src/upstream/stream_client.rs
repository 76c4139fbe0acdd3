//! SSE subscription to LaunchDarkly's upstream streaming endpoint.
//!
//! One [`UpstreamStreamClient`] per environment is the store's single
//! writer: it owns the `GET {streamBase}/all` connection, decodes
//! `put`/`patch`/`delete`/`indirect/*` frames, and applies them to the
//! [`relay_core::VersionedStore`] under the version-wins rule already
//! enforced there. Readiness fires exactly once, after the first `put`.

use crate::broadcaster::Broadcaster;
use crate::persistent::PersistentAdapter;
use crate::upstream::poller::PollRequestor;
use relay_core::error::backoff_delay;
use relay_core::streaming::{self, SseEvent, SseFrameBuffer};
use relay_core::{Kind, RelayError, Result, SharedStore, VersionedItem};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Connection lifecycle: `Disconnected -> Connecting -> Open (awaiting
/// first put) -> Live (put received) -> Disconnected`, with a `401`
/// moving straight to `Terminal` and staying there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Open,
    Live,
    Terminal,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Disconnected,
            1 => StreamState::Connecting,
            2 => StreamState::Open,
            3 => StreamState::Live,
            _ => StreamState::Terminal,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Connects to the upstream SSE endpoint for one environment and keeps the
/// store live for as long as the task runs. Construct with [`Self::new`]
/// and drive with [`Self::run`] inside a dedicated task; the task exits
/// only on `401` (terminal) or external cancellation.
pub struct UpstreamStreamClient {
    client: Client,
    stream_uri: String,
    sdk_key: String,
    environment: String,
    store: SharedStore,
    broadcaster: Broadcaster,
    poller: PollRequestor,
    persistent: Arc<dyn PersistentAdapter>,
    state: Arc<AtomicU8>,
    ready: Arc<Notify>,
}

impl UpstreamStreamClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        stream_uri: impl Into<String>,
        sdk_key: impl Into<String>,
        store: SharedStore,
        broadcaster: Broadcaster,
        poller: PollRequestor,
        persistent: Arc<dyn PersistentAdapter>,
    ) -> Self {
        Self::for_environment(client, stream_uri, sdk_key, "unknown", store, broadcaster, poller, persistent)
    }

    /// Build a client labeled with its owning environment's name, used for
    /// the `upstream_stream_state` gauge and the `401` log line.
    #[allow(clippy::too_many_arguments)]
    pub fn for_environment(
        client: Client,
        stream_uri: impl Into<String>,
        sdk_key: impl Into<String>,
        environment: impl Into<String>,
        store: SharedStore,
        broadcaster: Broadcaster,
        poller: PollRequestor,
        persistent: Arc<dyn PersistentAdapter>,
    ) -> Self {
        Self {
            client,
            stream_uri: stream_uri.into(),
            sdk_key: sdk_key.into(),
            environment: environment.into(),
            store,
            broadcaster,
            poller,
            persistent,
            state: Arc::new(AtomicU8::new(StreamState::Disconnected.as_u8())),
            ready: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
        self.record_state_metric(state);
    }

    #[cfg(feature = "monitoring")]
    fn record_state_metric(&self, state: StreamState) {
        crate::metrics::UPSTREAM_STREAM_STATE
            .with_label_values(&[&self.environment])
            .set(state.as_u8() as i64);
    }

    #[cfg(not(feature = "monitoring"))]
    fn record_state_metric(&self, _state: StreamState) {}

    /// Resolves once the stream has received its first `put` and the store
    /// is initialized. Fires exactly once per [`UpstreamStreamClient`].
    pub async fn wait_ready(&self) {
        if self.state() as u8 >= StreamState::Live.as_u8() {
            return;
        }
        self.ready.notified().await;
    }

    /// Drive the connect/read/reconnect loop until `401` or the caller
    /// drops/cancels the task. Errors other than auth rejection are logged
    /// and followed by a backoff-delayed reconnect; they never propagate.
    pub async fn run(&self) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(StreamState::Connecting);
            match self.connect_and_read().await {
                Ok(()) => {
                    // Upstream closed the connection cleanly; reconnect
                    // immediately without treating it as a failure streak.
                    attempt = 0;
                    self.set_state(StreamState::Disconnected);
                }
                Err(RelayError::UpstreamAuth { environment }) => {
                    tracing::error!(environment, "upstream rejected credential; stream will not reconnect");
                    self.set_state(StreamState::Terminal);
                    return;
                }
                Err(error) => {
                    tracing::warn!(%error, attempt, "upstream stream connection failed, will reconnect");
                    self.set_state(StreamState::Disconnected);
                    attempt += 1;
                    tokio::time::sleep(backoff_delay(attempt, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY)).await;
                }
            }
        }
    }

    async fn connect_and_read(&self) -> Result<()> {
        let url = format!("{}/all", self.stream_uri.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.sdk_key)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| RelayError::UpstreamTransient { message: e.to_string() })?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RelayError::UpstreamAuth { environment: self.sdk_key_suffix() });
        }
        if !response.status().is_success() {
            return Err(RelayError::UpstreamClient {
                status: response.status().as_u16(),
                message: response.status().to_string(),
            });
        }

        self.set_state(StreamState::Open);
        let mut buffer = SseFrameBuffer::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| RelayError::UpstreamTransient { message: e.to_string() })?;
            for (event_name, data) in buffer.push(&bytes) {
                if let Err(error) = self.handle_frame(&event_name, &data).await {
                    tracing::warn!(%error, event_name, "dropping malformed upstream frame");
                }
            }
        }
        Ok(())
    }

    async fn handle_frame(&self, event_name: &str, data: &str) -> Result<()> {
        match streaming::parse_sse_event(event_name, data)? {
            SseEvent::Put(snapshot) => {
                if let Err(error) = self.persistent.init(&snapshot).await {
                    tracing::warn!(%error, "failed to persist put snapshot to backing store");
                }
                self.store.init(snapshot).await;
                let was_live = self.state() as u8 >= StreamState::Live.as_u8();
                self.set_state(StreamState::Live);
                if !was_live {
                    self.ready.notify_waiters();
                }
                let frame = streaming::encode_put(&self.store.get_all().await)?;
                self.broadcaster.publish(frame).await;
            }
            SseEvent::Patch { path, version, payload } => {
                let (kind, key) = Kind::from_path(&path).ok_or_else(|| RelayError::MalformedPayload {
                    message: format!("patch on unrecognized path: {}", path),
                })?;
                let item = VersionedItem::live(key.clone(), version, payload.clone());
                if self.store.upsert(kind, item.clone()).await?.applied() {
                    if let Err(error) = self.persistent.upsert(kind, item).await {
                        tracing::warn!(%error, "failed to persist patch to backing store");
                    }
                    let frame = streaming::encode_patch(kind, &key, version, &payload)?;
                    self.broadcaster.publish(frame).await;
                }
            }
            SseEvent::Delete { path, version } => {
                let (kind, key) = Kind::from_path(&path).ok_or_else(|| RelayError::MalformedPayload {
                    message: format!("delete on unrecognized path: {}", path),
                })?;
                if self.store.delete(kind, &key, version).await?.applied() {
                    if let Err(error) = self.persistent.delete(kind, &key, version).await {
                        tracing::warn!(%error, "failed to persist delete to backing store");
                    }
                    let frame = streaming::encode_delete(kind, &key, version)?;
                    self.broadcaster.publish(frame).await;
                }
            }
            SseEvent::IndirectPatch { path } => {
                if let Some(item) = self.poller.fetch_item(&path).await? {
                    let (kind, _) = Kind::from_path(&path).ok_or_else(|| RelayError::MalformedPayload {
                        message: format!("indirect/patch on unrecognized path: {}", path),
                    })?;
                    if self.store.upsert(kind, item.clone()).await?.applied() {
                        if let Err(error) = self.persistent.upsert(kind, item.clone()).await {
                            tracing::warn!(%error, "failed to persist indirect patch to backing store");
                        }
                        let frame = streaming::encode_patch(kind, &item.key, item.version, &item.payload)?;
                        self.broadcaster.publish(frame).await;
                    }
                }
            }
            SseEvent::IndirectPut => {
                let snapshot = self.poller.fetch_snapshot().await?;
                if let Err(error) = self.persistent.init(&snapshot).await {
                    tracing::warn!(%error, "failed to persist indirect put snapshot to backing store");
                }
                self.store.init(snapshot).await;
                let was_live = self.state() as u8 >= StreamState::Live.as_u8();
                self.set_state(StreamState::Live);
                if !was_live {
                    self.ready.notify_waiters();
                }
                let frame = streaming::encode_put(&self.store.get_all().await)?;
                self.broadcaster.publish(frame).await;
            }
            SseEvent::Heartbeat => {}
        }
        Ok(())
    }

    /// Never log the full credential; a trailing fragment is enough to
    /// correlate with the configured environment in multi-environment logs.
    fn sdk_key_suffix(&self) -> String {
        let key = &self.sdk_key;
        if key.len() > 6 {
            format!("...{}", &key[key.len() - 6..])
        } else {
            key.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::testing::test_config;

    fn client() -> UpstreamStreamClient {
        let config = test_config();
        UpstreamStreamClient::new(
            Client::new(),
            config.upstream.stream_uri.clone(),
            config.environments[0].sdk_key.clone(),
            relay_core::store::shared_store(),
            Broadcaster::new(),
            PollRequestor::new(Client::new(), config.upstream.poll_uri.clone(), config.environments[0].sdk_key.clone()),
            Arc::new(crate::persistent::NoopAdapter),
        )
    }

    #[test]
    fn fresh_client_starts_disconnected() {
        assert_eq!(client().state(), StreamState::Disconnected);
    }

    #[tokio::test]
    async fn handle_frame_put_marks_live_and_notifies_once() {
        let c = client();
        c.handle_frame("put", r#"{"path":"/","data":{"flags":{},"segments":{}}}"#).await.unwrap();
        assert_eq!(c.state(), StreamState::Live);
        assert!(c.store.is_initialized());
    }

    #[tokio::test]
    async fn handle_frame_malformed_patch_is_rejected_without_panicking() {
        let c = client();
        let err = c.handle_frame("patch", r#"{"path":"/bogus/x","data":{"version":1}}"#).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload { .. }));
    }
}
