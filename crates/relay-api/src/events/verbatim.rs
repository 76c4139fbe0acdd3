//! Bounded queue + periodic flusher that POSTs raw events upstream
//! unchanged, for SDKs already sending the new (schema ≥ 3) event wire
//! format.

use crate::upstream::UpstreamEventPoster;
use relay_core::config::EventRelayConfig;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Raw-event relay schema version this relay always declares when
/// forwarding upstream, regardless of what the SDK sent: the relay itself
/// speaks the current wire format even when summarizing on the SDK's
/// behalf.
pub const RELAY_EVENT_SCHEMA: u32 = 3;

struct State {
    queue: VecDeque<Value>,
    /// `true` once a single capacity-exceeded warning has been logged for
    /// the current overflow streak; reset on the next successful drain so
    /// a later overflow warns again instead of logging once per event.
    warned: bool,
}

/// One per environment. `submit` is cheap and non-blocking (the whole
/// point of `EventIngest` responding `202` before processing); the
/// background flusher spawned by [`Self::spawn_flusher`] is the only task
/// that talks to the network.
pub struct VerbatimRelay {
    environment: String,
    config: EventRelayConfig,
    poster: UpstreamEventPoster,
    state: Mutex<State>,
    /// Gates sampling: every Nth submitted batch is kept, the rest
    /// dropped before they ever reach the queue — sampling runs before
    /// the capacity check, not after.
    batch_counter: AtomicU32,
    dropped_for_warning: AtomicBool,
}

impl VerbatimRelay {
    pub fn new(environment: impl Into<String>, config: EventRelayConfig, poster: UpstreamEventPoster) -> Arc<Self> {
        Arc::new(Self {
            environment: environment.into(),
            config,
            poster,
            state: Mutex::new(State { queue: VecDeque::new(), warned: false }),
            batch_counter: AtomicU32::new(0),
            dropped_for_warning: AtomicBool::new(false),
        })
    }

    /// Enqueue one `EventIngest` payload's worth of already-parsed events.
    /// `sendEvents: false` silently drops everything; the sampling gate
    /// applies per incoming payload, before any individual event is looked
    /// at or enqueued.
    pub async fn submit(&self, events: Vec<Value>) {
        if !self.config.send_events {
            return;
        }
        if self.config.sampling_interval > 1 {
            let n = self.batch_counter.fetch_add(1, Ordering::Relaxed);
            if n % self.config.sampling_interval != 0 {
                return;
            }
        }

        let mut state = self.state.lock().await;
        let mut overflowed = false;
        for event in events {
            if state.queue.len() >= self.config.capacity {
                overflowed = true;
                continue;
            }
            state.queue.push_back(event);
        }
        if overflowed && !state.warned {
            state.warned = true;
            tracing::warn!(capacity = self.config.capacity, "verbatim event queue at capacity, dropping newest events");
        }
        #[cfg(feature = "monitoring")]
        crate::metrics::EVENT_QUEUE_DEPTH
            .with_label_values(&[&self.environment, "verbatim"])
            .set(state.queue.len() as i64);
    }

    /// Drain the queue and POST it as one JSON array. A no-op when the
    /// queue is empty so the periodic flusher doesn't spam empty POSTs.
    pub async fn flush(&self) {
        let events: Vec<Value> = {
            let mut state = self.state.lock().await;
            if state.queue.is_empty() {
                return;
            }
            state.warned = false;
            state.queue.drain(..).collect()
        };

        let count = events.len();
        let body = match serde_json::to_vec(&events) {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(%error, "failed to serialize verbatim event batch, dropping");
                return;
            }
        };

        match self.poster.post_bulk(body, RELAY_EVENT_SCHEMA).await {
            Ok(()) => {
                self.dropped_for_warning.store(false, Ordering::Relaxed);
                tracing::debug!(count, "flushed verbatim events upstream");
                #[cfg(feature = "monitoring")]
                crate::metrics::EVENT_FLUSH_TOTAL.with_label_values(&[&self.environment, "verbatim"]).inc();
            }
            Err(error) => {
                if !self.dropped_for_warning.swap(true, Ordering::Relaxed) {
                    tracing::warn!(%error, count, "verbatim event flush failed, events dropped");
                }
                #[cfg(feature = "monitoring")]
                crate::metrics::EVENT_FLUSH_FAILURES_TOTAL.with_label_values(&[&self.environment, "verbatim"]).inc();
            }
        }
        #[cfg(feature = "monitoring")]
        crate::metrics::EVENT_QUEUE_DEPTH.with_label_values(&[&self.environment, "verbatim"]).set(0);
    }

    /// Spawn the periodic flusher task; the returned handle is owned by
    /// the Supervisor so it can be aborted on shutdown.
    pub fn spawn_flusher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.flush_interval);
            loop {
                ticker.tick().await;
                self.flush().await;
            }
        })
    }

    #[cfg(test)]
    async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(capacity: usize) -> EventRelayConfig {
        EventRelayConfig {
            capacity,
            flush_interval: std::time::Duration::from_millis(10),
            sampling_interval: 0,
            send_events: true,
        }
    }

    #[tokio::test]
    async fn submit_then_flush_posts_events_and_drains_queue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk"))
            .and(header("X-LaunchDarkly-Event-Schema", "3"))
            .and(body_json(serde_json::json!([{"kind": "custom"}])))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
        let relay = VerbatimRelay::new("test-env", config(10), poster);
        relay.submit(vec![serde_json::json!({"kind": "custom"})]).await;
        assert_eq!(relay.queue_len().await, 1);
        relay.flush().await;
        assert_eq!(relay.queue_len().await, 0);
    }

    #[tokio::test]
    async fn send_events_false_drops_everything() {
        let mut cfg = config(10);
        cfg.send_events = false;
        let poster = UpstreamEventPoster::new(Client::new(), "http://localhost:1".to_string(), "sdk-key".to_string());
        let relay = VerbatimRelay::new("test-env", cfg, poster);
        relay.submit(vec![serde_json::json!({"kind": "custom"})]).await;
        assert_eq!(relay.queue_len().await, 0);
    }

    #[tokio::test]
    async fn overflow_drops_newest_and_warns_once() {
        let poster = UpstreamEventPoster::new(Client::new(), "http://localhost:1".to_string(), "sdk-key".to_string());
        let relay = VerbatimRelay::new("test-env", config(2), poster);
        relay.submit(vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]).await;
        assert_eq!(relay.queue_len().await, 2);
    }

    #[tokio::test]
    async fn sampling_interval_keeps_one_in_n_batches() {
        let mut cfg = config(10);
        cfg.sampling_interval = 2;
        let poster = UpstreamEventPoster::new(Client::new(), "http://localhost:1".to_string(), "sdk-key".to_string());
        let relay = VerbatimRelay::new("test-env", cfg, poster);
        relay.submit(vec![serde_json::json!(1)]).await; // kept (counter 0 % 2 == 0)
        relay.submit(vec![serde_json::json!(2)]).await; // dropped
        relay.submit(vec![serde_json::json!(3)]).await; // kept
        assert_eq!(relay.queue_len().await, 2);
    }
}
