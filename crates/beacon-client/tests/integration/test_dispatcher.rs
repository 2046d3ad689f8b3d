//! Dispatcher behavior over the scripted transport

use std::{sync::Arc, time::Duration};

use beacon_client::{report_message, Client, ClientError};
use beacon_core::{
    domain::{Draft, Event, Level, Mode},
    payload::{PayloadBuilder, PayloadError},
    ports::TransportEvent,
};
use serde_json::{json, Map, Value};

use crate::common::{
    response, start_client, wait_until, LogCapture, MockTransport, TEST_ENDPOINT, TEST_TOKEN,
};

fn posted_json(transport: &MockTransport, index: usize) -> Value {
    serde_json::from_slice(&transport.post(index).request.body).expect("posted body is JSON")
}

#[tokio::test]
async fn test_start_acquires_pool_with_capacity() {
    let (client, transport) = start_client(Mode::Enabled);

    assert_eq!(transport.capacity(), Some(4));
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.mode, Mode::Enabled);
    assert!(!snapshot.rate_limited);
    assert_eq!(snapshot.pending_responses, 0);
}

#[tokio::test]
async fn test_pool_start_failure_is_fatal() {
    let result = Client::builder(TEST_TOKEN, "test").start(MockTransport::failing());
    assert!(matches!(result, Err(ClientError::Pool(_))));
}

#[test]
fn test_start_outside_runtime_fails() {
    let result = Client::builder(TEST_TOKEN, "test").start(MockTransport::new());
    assert!(matches!(result, Err(ClientError::NoRuntime)));
}

#[tokio::test]
async fn test_disabled_mode_never_posts() {
    let (client, transport) = start_client(Mode::Disabled);

    for i in 0..5 {
        client.emit(Event::message(Level::Error, format!("ignored {i}")));
    }
    let snapshot = client.snapshot().await.unwrap();

    assert_eq!(snapshot.mode, Mode::Disabled);
    assert_eq!(transport.post_count(), 0);
}

#[tokio::test]
async fn test_log_only_mode_logs_and_never_posts() {
    let (logs, _guard) = LogCapture::install();
    let (client, transport) = start_client(Mode::LogOnly);

    let mut body = Map::new();
    body.insert("message".to_string(), json!({"body": "cache miss storm"}));
    let event = Event::new(Level::Warning, 1_699_999_999, body, Map::new(), Map::new()).unwrap();
    client.emit(event);
    client.snapshot().await.unwrap();

    assert_eq!(transport.post_count(), 0);
    let output = logs.contents();
    assert!(
        output.contains("report (level: warning, timestamp: 1699999999)"),
        "missing log-only line in: {output}"
    );
    assert!(output.contains("cache miss storm"));
}

#[tokio::test]
async fn test_enabled_mode_posts_composed_report() {
    let (client, transport) = start_client(Mode::Enabled);

    let mut custom = Map::new();
    custom.insert("tenant".to_string(), json!("acme"));
    client.emit(Event::message(Level::Error, "payment gateway timed out").with_custom(custom));
    client.snapshot().await.unwrap();

    assert_eq!(transport.post_count(), 1);
    let post = transport.post(0);
    assert_eq!(post.request.url, TEST_ENDPOINT);
    assert!(post
        .request
        .headers
        .contains(&("content-type".to_string(), "application/json".to_string())));

    let document = posted_json(&transport, 0);
    assert_eq!(document["access_token"], TEST_TOKEN);
    assert_eq!(document["data"]["environment"], "test");
    assert_eq!(document["data"]["level"], "error");
    assert_eq!(
        document["data"]["body"]["message"]["body"],
        "payment gateway timed out"
    );
    assert_eq!(document["data"]["custom"]["tenant"], "acme");
    assert!(document["data"]["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_reports_post_in_emit_order() {
    let (client, transport) = start_client(Mode::Enabled);

    for text in ["first", "second", "third"] {
        client.emit(Event::message(Level::Info, text));
    }
    client.snapshot().await.unwrap();

    let bodies: Vec<Value> = (0..3)
        .map(|i| posted_json(&transport, i)["data"]["body"]["message"]["body"].clone())
        .collect();
    assert_eq!(bodies, vec![json!("first"), json!("second"), json!("third")]);
}

#[tokio::test]
async fn test_report_message_front_end() {
    let (client, transport) = start_client(Mode::Enabled);

    let mut occurrence = Map::new();
    occurrence.insert("context".to_string(), json!("nightly-import"));
    report_message(Some(&client), Level::Debug, "rows skipped", Map::new(), occurrence);
    client.snapshot().await.unwrap();

    let document = posted_json(&transport, 0);
    assert_eq!(document["data"]["level"], "debug");
    assert_eq!(document["data"]["context"], "nightly-import");
}

#[tokio::test]
async fn test_completed_response_clears_pending_entry() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "hello"));
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.in_flight, 1);
    assert_eq!(snapshot.pending_responses, 0);

    let events = response(
        200,
        &[("Content-Type", "application/json")],
        &["{\"err\":0,\"result\"", ":{\"id\":null}}"],
    );
    let (head, tail) = events.split_at(3);
    transport.respond(0, head.to_vec());
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 1);

    transport.respond(0, tail.to_vec());
    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.pending_responses, 0);
    assert_eq!(snapshot.in_flight, 0);
}

#[tokio::test]
async fn test_interleaved_responses_are_tracked_per_handle() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "one"));
    client.emit(Event::message(Level::Info, "two"));
    client.snapshot().await.unwrap();

    let status = |code| TransportEvent::Status {
        code,
        description: String::new(),
    };
    transport.respond(0, vec![status(200), TransportEvent::Headers(Vec::new())]);
    transport.respond(1, vec![status(500), TransportEvent::Headers(Vec::new())]);
    transport.respond(1, vec![TransportEvent::BodyChunk(b"{\"err\":1,".to_vec())]);
    transport.respond(0, vec![TransportEvent::BodyChunk(b"{\"err\":0}".to_vec())]);
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 2);

    transport.respond(0, vec![TransportEvent::Done]);
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 1);

    transport.respond(
        1,
        vec![
            TransportEvent::BodyChunk(b"\"message\":\"boom\"}".to_vec()),
            TransportEvent::Done,
        ],
    );
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 0);
}

#[tokio::test]
async fn test_error_before_status_is_harmless() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "hello"));
    client.snapshot().await.unwrap();
    transport.respond(0, vec![TransportEvent::Error("connection refused".to_string())]);

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot.pending_responses, 0);
    assert_eq!(snapshot.in_flight, 0);
    assert!(client.is_running());
}

#[tokio::test]
async fn test_error_mid_body_discards_entry() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "hello"));
    client.snapshot().await.unwrap();
    transport.respond(
        0,
        vec![
            TransportEvent::Status {
                code: 200,
                description: "OK".to_string(),
            },
            TransportEvent::Headers(Vec::new()),
            TransportEvent::BodyChunk(b"{\"err\"".to_vec()),
        ],
    );
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 1);

    transport.respond(0, vec![TransportEvent::Error("connection reset".to_string())]);
    assert_eq!(client.snapshot().await.unwrap().pending_responses, 0);
}

#[tokio::test]
async fn test_chunk_for_unknown_handle_is_dropped() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "hello"));
    client.snapshot().await.unwrap();
    transport.respond(
        0,
        vec![
            TransportEvent::BodyChunk(b"orphan".to_vec()),
            TransportEvent::Done,
        ],
    );

    assert_eq!(client.snapshot().await.unwrap().pending_responses, 0);
}

#[tokio::test]
async fn test_post_failure_drops_report_and_keeps_running() {
    let transport = MockTransport::rejecting();
    let client = Client::builder(TEST_TOKEN, "test")
        .start(transport.clone())
        .unwrap();

    client.emit(Event::message(Level::Error, "lost"));
    client.emit(Event::message(Level::Error, "also lost"));

    assert!(client.snapshot().await.is_some());
    assert_eq!(transport.post_count(), 0);
}

struct FailingPayload;

impl PayloadBuilder for FailingPayload {
    fn compose(&self, _draft: &Draft, _event: &Event) -> Result<Vec<u8>, PayloadError> {
        Err(PayloadError::Encode("unencodable value".to_string()))
    }
}

#[tokio::test]
async fn test_encode_failure_drops_report() {
    let transport = MockTransport::new();
    let client = Client::builder(TEST_TOKEN, "test")
        .payload_builder(Arc::new(FailingPayload))
        .start(transport.clone())
        .unwrap();

    client.emit(Event::message(Level::Error, "unencodable"));

    assert!(client.snapshot().await.is_some());
    assert_eq!(transport.post_count(), 0);
}

#[tokio::test]
async fn test_shutdown_releases_pool() {
    let (client, transport) = start_client(Mode::Enabled);

    client.shutdown();
    assert!(!client.is_running());
    assert!(wait_until(Duration::from_secs(2), || transport.is_stopped()).await);
    assert!(client.snapshot().await.is_none());

    // Emitting after shutdown is a logged no-op.
    client.emit(Event::message(Level::Info, "too late"));
    assert_eq!(transport.post_count(), 0);
}

#[tokio::test]
async fn test_emit_right_after_shutdown_warns() {
    let (logs, _guard) = LogCapture::install();
    let (client, transport) = start_client(Mode::Enabled);

    // The dispatcher task has not observed the cancellation yet.
    client.shutdown();
    client.emit(Event::message(Level::Error, "after shutdown"));

    assert!(
        logs.contents()
            .contains("Report client is not running, dropping report"),
        "missing warning in: {}",
        logs.contents()
    );
    assert!(wait_until(Duration::from_secs(2), || transport.is_stopped()).await);
    assert_eq!(transport.post_count(), 0);
}

#[tokio::test]
async fn test_responses_after_shutdown_are_ignored() {
    let (client, transport) = start_client(Mode::Enabled);

    client.emit(Event::message(Level::Info, "in flight"));
    client.snapshot().await.unwrap();
    client.shutdown();
    assert!(wait_until(Duration::from_secs(2), || transport.is_stopped()).await);

    transport.respond(0, response(200, &[], &["{\"err\":0}"]));
    assert!(client.snapshot().await.is_none());
}

#[tokio::test]
async fn test_dropping_last_client_stops_dispatcher() {
    let (client, transport) = start_client(Mode::Enabled);
    let clone = client.clone();

    drop(client);
    assert!(clone.snapshot().await.is_some());

    drop(clone);
    assert!(wait_until(Duration::from_secs(2), || transport.is_stopped()).await);
}
