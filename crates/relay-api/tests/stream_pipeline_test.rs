//! Upstream SSE stream -> store -> broadcaster pipeline, exercised against a
//! mocked upstream endpoint rather than individual unit-level pieces.

use relay_api::broadcaster::Broadcaster;
use relay_api::persistent::NoopAdapter;
use relay_api::upstream::{PollRequestor, StreamState, UpstreamStreamClient};
use relay_core::{store, Kind};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn client_for(server: &MockServer, shared_store: relay_core::SharedStore, broadcaster: Broadcaster) -> UpstreamStreamClient {
    let http = Client::new();
    UpstreamStreamClient::for_environment(
        http.clone(),
        server.uri(),
        "sdk-key",
        "scenario-env",
        shared_store,
        broadcaster,
        PollRequestor::new(http, server.uri(), "sdk-key"),
        Arc::new(NoopAdapter),
    )
}

#[tokio::test]
async fn put_then_patch_updates_store_and_broadcasts_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":{\"flags\":{\"f1\":{\"key\":\"f1\",\"version\":1,\"on\":true}},\"segments\":{}}}\n\n",
        "event: patch\n",
        "data: {\"path\":\"/flags/f1\",\"data\":{\"key\":\"f1\",\"version\":2,\"on\":false}}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/all"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"))
        .mount(&server)
        .await;

    let shared_store = store::shared_store();
    let broadcaster = Broadcaster::new();
    let mut subscription = broadcaster.attach().await;
    let client = client_for(&server, shared_store.clone(), broadcaster.clone());
    tokio::spawn(async move { client.run().await });

    let put_frame = tokio::time::timeout(RECV_TIMEOUT, subscription.recv())
        .await
        .expect("put frame timed out")
        .expect("put frame channel closed");
    assert!(String::from_utf8_lossy(&put_frame).starts_with("event: put"));

    let patch_frame = tokio::time::timeout(RECV_TIMEOUT, subscription.recv())
        .await
        .expect("patch frame timed out")
        .expect("patch frame channel closed");
    assert!(String::from_utf8_lossy(&patch_frame).starts_with("event: patch"));

    let item = shared_store.get(Kind::Flags, "f1").await.expect("item present");
    assert_eq!(item.version, 2);
}

#[tokio::test]
async fn delete_tombstones_and_suppresses_a_later_stale_patch() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: put\n",
        "data: {\"path\":\"/\",\"data\":{\"flags\":{\"f1\":{\"key\":\"f1\",\"version\":1,\"on\":true}},\"segments\":{}}}\n\n",
        "event: delete\n",
        "data: {\"path\":\"/flags/f1\",\"version\":3}\n\n",
        "event: patch\n",
        "data: {\"path\":\"/flags/f1\",\"data\":{\"key\":\"f1\",\"version\":2,\"on\":true}}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/all"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"))
        .mount(&server)
        .await;

    let shared_store = store::shared_store();
    let broadcaster = Broadcaster::new();
    let mut subscription = broadcaster.attach().await;
    let client = client_for(&server, shared_store.clone(), broadcaster.clone());
    tokio::spawn(async move { client.run().await });

    let put_frame = tokio::time::timeout(RECV_TIMEOUT, subscription.recv()).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&put_frame).starts_with("event: put"));
    let delete_frame = tokio::time::timeout(RECV_TIMEOUT, subscription.recv()).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&delete_frame).starts_with("event: delete"));

    // The stale patch (version 2, tombstone is at version 3) must never be
    // broadcast: no third frame should arrive.
    assert!(tokio::time::timeout(Duration::from_millis(200), subscription.recv()).await.is_err());

    let item = shared_store.get_raw(Kind::Flags, "f1").await.expect("tombstone present");
    assert!(item.deleted);
    assert_eq!(item.version, 3);
    assert!(shared_store.get(Kind::Flags, "f1").await.is_none());
}

#[tokio::test]
async fn upstream_401_marks_stream_terminal_and_does_not_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/all")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

    let shared_store = store::shared_store();
    let broadcaster = Broadcaster::new();
    let client = std::sync::Arc::new(client_for(&server, shared_store, broadcaster));
    let runner = client.clone();
    let join = tokio::spawn(async move { runner.run().await });
    tokio::time::timeout(RECV_TIMEOUT, join).await.expect("run() did not terminate").unwrap();

    assert_eq!(client.state(), StreamState::Terminal);
}

#[tokio::test]
async fn a_slow_subscriber_is_degraded_without_blocking_a_fast_one() {
    let broadcaster = Broadcaster::new();
    let mut fast = broadcaster.attach().await;
    let slow = broadcaster.attach().await;

    // Drain `fast` concurrently with publishing so it never backs up, while
    // `slow` never reads and accumulates past its queue capacity.
    let drain = tokio::spawn(async move {
        let mut received = 0;
        while tokio::time::timeout(Duration::from_millis(200), fast.recv()).await.ok().flatten().is_some() {
            received += 1;
        }
        received
    });

    for i in 0..150 {
        broadcaster.publish(bytes::Bytes::from(format!("frame-{}", i))).await;
        tokio::task::yield_now().await;
    }

    let received = drain.await.unwrap();
    assert!(slow.is_degraded());
    assert_eq!(received, 150, "fast subscriber should receive every frame without interruption");
}
