//! reqwest transport against a wiremock collector

use std::{sync::Arc, time::Duration};

use beacon_client::{Client, HttpTransport, HttpTransportConfig};
use beacon_core::{
    domain::{Event, Level},
    ports::{PostRequest, ResponseSink, Transport, TransportEvent},
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::TEST_TOKEN;

const ITEM_PATH: &str = "/api/1/item/";

/// Collects every event for every handle into a channel.
fn channel_sink() -> (ResponseSink, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = ResponseSink::new(move |_, event| {
        let _ = tx.send(event);
    });
    (sink, rx)
}

/// Receives events until a terminal one arrives.
async fn collect_until_terminal(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("transport event within timeout")
            .expect("sink still open");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

#[tokio::test]
async fn test_post_streams_status_headers_body_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ITEM_PATH))
        .and(header("content-type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"err": 0, "result": {"id": null}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::with_defaults();
    transport.start_pool(2).unwrap();
    let (sink, mut rx) = channel_sink();

    let url = format!("{}{}", server.uri(), ITEM_PATH);
    transport
        .post(PostRequest::json(url, b"{\"access_token\":\"t\"}".to_vec()), sink)
        .unwrap();

    let events = collect_until_terminal(&mut rx).await;
    assert!(matches!(
        events.first(),
        Some(TransportEvent::Status { code: 200, .. })
    ));
    assert!(matches!(events.get(1), Some(TransportEvent::Headers(_))));
    assert_eq!(events.last(), Some(&TransportEvent::Done));

    let body: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::BodyChunk(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["err"], 0);

    transport.stop_pool();
}

#[tokio::test]
async fn test_rate_limit_header_keeps_canonical_case() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Remaining-Seconds", "60")
                .set_body_json(json!({"err": 1, "message": "rate limit reached"})),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::with_defaults();
    transport.start_pool(1).unwrap();
    let (sink, mut rx) = channel_sink();
    transport
        .post(PostRequest::json(server.uri(), Vec::new()), sink)
        .unwrap();

    let events = collect_until_terminal(&mut rx).await;
    let headers = events
        .iter()
        .find_map(|e| match e {
            TransportEvent::Headers(headers) => Some(headers.clone()),
            _ => None,
        })
        .unwrap();
    assert!(headers.contains(&(
        "X-Rate-Limit-Remaining-Seconds".to_string(),
        "60".to_string()
    )));
}

#[tokio::test]
async fn test_connection_failure_delivers_only_error() {
    let transport = HttpTransport::new(HttpTransportConfig {
        timeout: Duration::from_secs(2),
        ..HttpTransportConfig::default()
    });
    transport.start_pool(1).unwrap();
    let (sink, mut rx) = channel_sink();

    // Port 9 (discard) is closed on test hosts.
    transport
        .post(PostRequest::json("http://127.0.0.1:9/", Vec::new()), sink)
        .unwrap();

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TransportEvent::Error(_)));
}

#[tokio::test]
async fn test_requests_beyond_capacity_queue_and_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"err": 0}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let transport = HttpTransport::with_defaults();
    transport.start_pool(1).unwrap();
    let (sink, mut rx) = channel_sink();

    let mut handles = Vec::new();
    for _ in 0..3 {
        handles.push(
            transport
                .post(PostRequest::json(server.uri(), Vec::new()), sink.clone())
                .unwrap(),
        );
    }
    handles.dedup();
    assert_eq!(handles.len(), 3, "each post gets its own handle");

    let mut done = 0;
    while done < 3 {
        if collect_until_terminal(&mut rx).await.last() == Some(&TransportEvent::Done) {
            done += 1;
        }
    }
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..500 {
        if server.received_requests().await.unwrap_or_default().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("collector did not receive {count} requests");
}

#[tokio::test]
async fn test_client_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ITEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"err": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder(TEST_TOKEN, "staging")
        .endpoint(format!("{}{}", server.uri(), ITEM_PATH))
        .pool_capacity(2)
        .start(Arc::new(HttpTransport::with_defaults()))
        .unwrap();

    client.emit(Event::message(Level::Warning, "disk 91% full"));
    wait_for_requests(&server, 1).await;

    let requests = server.received_requests().await.unwrap();
    let document: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(document["access_token"], TEST_TOKEN);
    assert_eq!(document["data"]["environment"], "staging");
    assert_eq!(document["data"]["level"], "warning");
    assert_eq!(document["data"]["language"], "rust");

    client.shutdown();
    server.verify().await;
}

#[tokio::test]
async fn test_client_engages_rate_limit_from_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Remaining-Seconds", "60")
                .set_body_json(json!({"err": 1, "message": "rate limit reached"})),
        )
        .mount(&server)
        .await;

    let client = Client::builder(TEST_TOKEN, "staging")
        .endpoint(server.uri())
        .start(Arc::new(HttpTransport::with_defaults()))
        .unwrap();

    client.emit(Event::message(Level::Error, "first"));

    let mut limited = false;
    for _ in 0..500 {
        if client.snapshot().await.map(|s| s.rate_limited).unwrap_or(false) {
            limited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(limited, "client never saw the rate limit");

    client.emit(Event::message(Level::Error, "suppressed"));
    client.snapshot().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    client.shutdown();
}
