//! Summarization for legacy (schema < 3) event payloads: individual
//! feature-request events are folded into a rolling per-`(flagKey,
//! variation, version)` counter instead of being relayed verbatim.

use crate::events::verbatim::RELAY_EVENT_SCHEMA;
use crate::upstream::UpstreamEventPoster;
use relay_core::config::EventRelayConfig;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    flag_key: String,
    variation: Option<i64>,
    version: Option<i64>,
}

#[derive(Debug, Clone)]
struct Counter {
    count: u64,
    value: Value,
}

struct State {
    counters: HashMap<CounterKey, Counter>,
    defaults: HashMap<String, Value>,
    window: Option<(i64, i64)>,
    pending: VecDeque<Value>,
    warned: bool,
}

impl State {
    fn new() -> Self {
        Self {
            counters: HashMap::new(),
            defaults: HashMap::new(),
            window: None,
            pending: VecDeque::new(),
            warned: false,
        }
    }
}

/// One per environment. Maintains the summary counters in a `HashMap`
/// guarded by a `Mutex`, since `submit` is called concurrently from the
/// ingest background tasks of many simultaneous HTTP requests rather than
/// from a single serial processor.
pub struct SummarizingRelay {
    environment: String,
    config: EventRelayConfig,
    poster: UpstreamEventPoster,
    state: Mutex<State>,
    dropped_for_warning: AtomicBool,
}

impl SummarizingRelay {
    pub fn new(environment: impl Into<String>, config: EventRelayConfig, poster: UpstreamEventPoster) -> Arc<Self> {
        Arc::new(Self {
            environment: environment.into(),
            config,
            poster,
            state: Mutex::new(State::new()),
            dropped_for_warning: AtomicBool::new(false),
        })
    }

    /// Feed a legacy-schema batch. `FeatureRequestEvent`-shaped records
    /// update the rolling counters; everything else is queued to pass
    /// through verbatim at the next flush.
    pub async fn submit(&self, events: Vec<Value>) {
        if !self.config.send_events {
            return;
        }
        let mut state = self.state.lock().await;
        for event in events {
            if is_feature_request(&event) {
                record(&mut state, &event);
            } else if state.pending.len() >= self.config.capacity {
                if !state.warned {
                    state.warned = true;
                    tracing::warn!(capacity = self.config.capacity, "summarizer pass-through queue at capacity, dropping newest events");
                }
            } else {
                state.pending.push_back(event);
            }
        }
        #[cfg(feature = "monitoring")]
        crate::metrics::EVENT_QUEUE_DEPTH
            .with_label_values(&[&self.environment, "summarizing"])
            .set((state.pending.len() + state.counters.len()) as i64);
    }

    /// Emit the accumulated pass-through events plus one synthesized
    /// `summary` event, then reset every counter. A no-op when nothing has
    /// accumulated since the last flush.
    pub async fn flush(&self) {
        let (pending, counters, defaults, window) = {
            let mut state = self.state.lock().await;
            if state.pending.is_empty() && state.counters.is_empty() {
                return;
            }
            state.warned = false;
            (
                state.pending.drain(..).collect::<Vec<_>>(),
                std::mem::take(&mut state.counters),
                std::mem::take(&mut state.defaults),
                state.window.take(),
            )
        };

        let mut events = pending;
        if !counters.is_empty() {
            events.push(build_summary_event(counters, defaults, window));
        }

        let count = events.len();
        let body = match serde_json::to_vec(&events) {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(%error, "failed to serialize summary event batch, dropping");
                return;
            }
        };

        match self.poster.post_bulk(body, RELAY_EVENT_SCHEMA).await {
            Ok(()) => {
                self.dropped_for_warning.store(false, Ordering::Relaxed);
                tracing::debug!(count, "flushed summarized events upstream");
                #[cfg(feature = "monitoring")]
                crate::metrics::EVENT_FLUSH_TOTAL.with_label_values(&[&self.environment, "summarizing"]).inc();
            }
            Err(error) => {
                if !self.dropped_for_warning.swap(true, Ordering::Relaxed) {
                    tracing::warn!(%error, count, "summary event flush failed, events dropped");
                }
                #[cfg(feature = "monitoring")]
                crate::metrics::EVENT_FLUSH_FAILURES_TOTAL.with_label_values(&[&self.environment, "summarizing"]).inc();
            }
        }
        #[cfg(feature = "monitoring")]
        crate::metrics::EVENT_QUEUE_DEPTH.with_label_values(&[&self.environment, "summarizing"]).set(0);
    }

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
    async fn counter_count(&self) -> usize {
        self.state.lock().await.counters.len()
    }
}

fn is_feature_request(event: &Value) -> bool {
    event.get("kind").and_then(|k| k.as_str()) == Some("feature")
}

fn record(state: &mut State, event: &Value) {
    let flag_key = event.get("key").and_then(|k| k.as_str()).unwrap_or_default().to_string();
    let variation = event.get("variation").and_then(|v| v.as_i64());
    let version = event.get("version").and_then(|v| v.as_i64());
    let timestamp = event.get("creationDate").and_then(|v| v.as_i64()).unwrap_or(0);
    let value = event.get("value").cloned().unwrap_or(Value::Null);
    let default = event.get("default").cloned().unwrap_or(Value::Null);

    let key = CounterKey { flag_key: flag_key.clone(), variation, version };
    let counter = state.counters.entry(key).or_insert(Counter { count: 0, value: Value::Null });
    counter.count += 1;
    counter.value = value;
    state.defaults.insert(flag_key, default);

    state.window = Some(match state.window {
        None => (timestamp, timestamp),
        Some((start, end)) => (start.min(timestamp), end.max(timestamp)),
    });
}

fn build_summary_event(counters: HashMap<CounterKey, Counter>, defaults: HashMap<String, Value>, window: Option<(i64, i64)>) -> Value {
    let (start, end) = window.unwrap_or((0, 0));
    let mut features: HashMap<String, Vec<Value>> = HashMap::new();
    for (key, counter) in counters {
        features.entry(key.flag_key.clone()).or_default().push(serde_json::json!({
            "variation": key.variation,
            "version": key.version,
            "count": counter.count,
            "value": counter.value,
        }));
    }

    let features_json: serde_json::Map<String, Value> = features
        .into_iter()
        .map(|(flag_key, counters)| {
            let default = defaults.get(&flag_key).cloned().unwrap_or(Value::Null);
            (flag_key, serde_json::json!({ "default": default, "counters": counters }))
        })
        .collect();

    serde_json::json!({
        "kind": "summary",
        "startDate": start,
        "endDate": end,
        "features": features_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> EventRelayConfig {
        EventRelayConfig {
            capacity: 100,
            flush_interval: std::time::Duration::from_millis(10),
            sampling_interval: 0,
            send_events: true,
        }
    }

    #[tokio::test]
    async fn n_feature_events_summarize_to_one_counter_with_min_max_timestamps() {
        let poster = UpstreamEventPoster::new(Client::new(), "http://localhost:1".to_string(), "sdk-key".to_string());
        let relay = SummarizingRelay::new("test-env", config(), poster);
        for ts in [100, 300, 200] {
            relay
                .submit(vec![serde_json::json!({
                    "kind": "feature", "key": "f1", "variation": 0, "version": 1,
                    "creationDate": ts, "value": true, "default": false,
                })])
                .await;
        }
        assert_eq!(relay.counter_count().await, 1);
        let state = relay.state.lock().await;
        let window = state.window.unwrap();
        assert_eq!(window, (100, 300));
        let counter = state.counters.values().next().unwrap();
        assert_eq!(counter.count, 3);
    }

    #[tokio::test]
    async fn non_feature_events_pass_through_verbatim_on_flush() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/bulk")).respond_with(ResponseTemplate::new(202)).expect(1).mount(&server).await;

        let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
        let relay = SummarizingRelay::new("test-env", config(), poster);
        relay.submit(vec![serde_json::json!({"kind": "identify", "key": "u1"})]).await;
        relay.flush().await;
    }

    #[tokio::test]
    async fn flush_emits_summary_event_shape() {
        let poster = UpstreamEventPoster::new(Client::new(), "http://localhost:1".to_string(), "sdk-key".to_string());
        let relay = SummarizingRelay::new("test-env", config(), poster);
        relay
            .submit(vec![serde_json::json!({
                "kind": "feature", "key": "f1", "variation": 0, "version": 1,
                "creationDate": 100, "value": true, "default": false,
            })])
            .await;
        let (counters, defaults, window) = {
            let mut state = relay.state.lock().await;
            (std::mem::take(&mut state.counters), std::mem::take(&mut state.defaults), state.window.take())
        };
        let summary = build_summary_event(counters, defaults, window);
        assert_eq!(summary["kind"], "summary");
        assert_eq!(summary["startDate"], 100);
        assert_eq!(summary["endDate"], 100);
        assert_eq!(summary["features"]["f1"]["counters"][0]["count"], 1);
    }
}
