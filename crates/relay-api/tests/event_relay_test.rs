//! Event-forwarding pipeline: the summarizing and verbatim relays, each
//! driven through `submit`/`flush` against a mocked upstream events endpoint.

use relay_api::events::{SummarizingRelay, VerbatimRelay};
use relay_api::upstream::UpstreamEventPoster;
use relay_core::config::EventRelayConfig;
use reqwest::Client;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(capacity: usize) -> EventRelayConfig {
    EventRelayConfig { capacity, flush_interval: Duration::from_secs(3600), sampling_interval: 0, send_events: true }
}

#[tokio::test]
async fn legacy_schema_feature_events_flush_to_a_single_summary_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/bulk")).respond_with(ResponseTemplate::new(202)).mount(&server).await;

    let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
    let relay = SummarizingRelay::new("scenario-env", config(100), poster);
    relay
        .submit(vec![serde_json::json!({
            "kind": "feature", "key": "f1", "variation": 0, "version": 1,
            "creationDate": 100, "value": true, "default": false,
        })])
        .await;
    relay.flush().await;

    let requests = server.received_requests().await.expect("request recording enabled");
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let events = body.as_array().expect("body is a JSON array");
    assert_eq!(events.len(), 1);
    let summary = &events[0];
    assert_eq!(summary["kind"], "summary");
    assert_eq!(summary["startDate"], 100);
    assert_eq!(summary["endDate"], 100);
    let counters = &summary["features"]["f1"]["counters"];
    assert_eq!(counters[0]["variation"], 0);
    assert_eq!(counters[0]["version"], 1);
    assert_eq!(counters[0]["count"], 1);
}

#[tokio::test]
async fn verbatim_relay_drops_events_past_capacity_and_flushes_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/bulk")).respond_with(ResponseTemplate::new(202)).mount(&server).await;

    let poster = UpstreamEventPoster::new(Client::new(), server.uri(), "sdk-key".to_string());
    let relay = VerbatimRelay::new("scenario-env", config(1000), poster);

    let events: Vec<serde_json::Value> = (0..1001).map(|i| serde_json::json!({"kind": "custom", "i": i})).collect();
    relay.submit(events).await;
    relay.flush().await;

    let requests = server.received_requests().await.expect("request recording enabled");
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1000);

    // A later submission within capacity does not re-trigger the
    // already-coalesced warning and still flushes normally.
    relay.submit(vec![serde_json::json!({"kind": "custom", "i": "next"})]).await;
    relay.flush().await;
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
}
