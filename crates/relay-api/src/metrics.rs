//! Prometheus metrics for the relay's operational surface: upstream stream
//! health, downstream fan-out pressure, and event-relay throughput. Gated
//! behind the `monitoring` feature; every recorder is a no-op to call but
//! genuinely absent from the binary when the feature is off.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Process-wide Prometheus registry for the relay's own metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Upstream SSE connection state per environment, as
    /// `crate::upstream::StreamState::as_u8()`
    /// (0=Disconnected, 1=Connecting, 2=Open, 3=Live, 4=Terminal).
    pub static ref UPSTREAM_STREAM_STATE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("upstream_stream_state", "Upstream SSE connection state")
            .namespace("flag_relay"),
        &["environment"]
    ).unwrap();

    /// Attached downstream SSE subscribers per environment.
    pub static ref DOWNSTREAM_SUBSCRIBER_COUNT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("downstream_subscriber_count", "Attached downstream SSE subscribers")
            .namespace("flag_relay"),
        &["environment"]
    ).unwrap();

    /// Queued-but-not-yet-flushed events per environment/relay.
    pub static ref EVENT_QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("event_queue_depth", "Events queued for the next upstream flush")
            .namespace("flag_relay"),
        &["environment", "relay"]
    ).unwrap();

    /// Completed flushes to the upstream events endpoint.
    pub static ref EVENT_FLUSH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("event_flush_total", "Completed event flushes to upstream")
            .namespace("flag_relay"),
        &["environment", "relay"]
    ).unwrap();

    /// Flushes that never reached the upstream events endpoint.
    pub static ref EVENT_FLUSH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("event_flush_failures_total", "Event flushes that failed to reach upstream")
            .namespace("flag_relay"),
        &["environment", "relay"]
    ).unwrap();
}

/// Register every metric with [`REGISTRY`]. Call once at startup before
/// the first scrape; safe to call more than once (later calls return the
/// `AlreadyReg` error, which callers may ignore).
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(UPSTREAM_STREAM_STATE.clone()))?;
    REGISTRY.register(Box::new(DOWNSTREAM_SUBSCRIBER_COUNT.clone()))?;
    REGISTRY.register(Box::new(EVENT_QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(EVENT_FLUSH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENT_FLUSH_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Render the registry in Prometheus text exposition format, for `GET /metrics`.
pub fn export() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder.encode_to_string(&metric_families)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_updated_gauge_values() {
        let _ = init_metrics();
        DOWNSTREAM_SUBSCRIBER_COUNT.with_label_values(&["test-env"]).set(3);
        let text = export().unwrap();
        assert!(text.contains("flag_relay_downstream_subscriber_count"));
        assert!(text.contains("test-env"));
    }

    #[test]
    fn event_flush_counters_are_labeled_by_environment_and_relay() {
        let _ = init_metrics();
        EVENT_FLUSH_TOTAL.with_label_values(&["test-env", "verbatim"]).inc();
        EVENT_FLUSH_FAILURES_TOTAL.with_label_values(&["test-env", "summarizing"]).inc();
        let text = export().unwrap();
        assert!(text.contains("flag_relay_event_flush_total"));
        assert!(text.contains("flag_relay_event_flush_failures_total"));
    }
}
