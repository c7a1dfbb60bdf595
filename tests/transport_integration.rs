//! Integration tests for the reqwest-backed transport and the file sink.
//!
//! These tests run the full execution path against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use reqtask::{
    BackoffPolicy, ChannelSink, ReqwestTransport, RequestDescriptor, RequestEvent,
    RequestExecutor, RequestHandle, ResponseBody, RetryDecision, RetryPolicy, StreamingFileSink,
    Transport, TransportError,
};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Policy that never retries; keeps failure tests fast.
struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _cause: &TransportError, _attempt: u32) -> RetryDecision {
        RetryDecision::DoNotRetry {
            reason: "retries disabled".to_string(),
        }
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RequestEvent>) -> Vec<RequestEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn wait_until_finished(handle: &RequestHandle) {
    for _ in 0..500 {
        if handle.is_finished() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request did not finish in time");
}

#[tokio::test]
async fn test_buffering_sink_round_trips_body() {
    let mock_server = MockServer::start().await;
    let content = b"This is the complete response body.\nLine 2.";

    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;

    let (sink, mut rx) = ChannelSink::pair();
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("{}/resource", mock_server.uri())),
        Arc::new(ReqwestTransport::new()),
        Arc::new(BackoffPolicy::default()),
        Arc::new(sink),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(RequestEvent::Started)));
    assert!(matches!(events.last(), Some(RequestEvent::Finished)));
    let succeeded = events.iter().find_map(|e| match e {
        RequestEvent::Succeeded { status, body } => Some((*status, body.clone())),
        _ => None,
    });
    match succeeded {
        Some((200, ResponseBody::Bytes(bytes))) => assert_eq!(bytes.as_ref(), content),
        other => panic!("Expected buffered success, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_request_sends_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resource"))
        .and(header("X-Trace", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"traced"))
        .mount(&mock_server)
        .await;

    let (sink, mut rx) = ChannelSink::pair();
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("{}/resource", mock_server.uri()))
            .header("X-Trace", "abc123"),
        Arc::new(ReqwestTransport::new()),
        Arc::new(NoRetry),
        Arc::new(sink),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    assert!(
        events.iter().any(|e| matches!(e, RequestEvent::Succeeded { .. })),
        "header must reach the server: {events:?}"
    );
}

#[tokio::test]
async fn test_file_sink_streams_known_length_body() {
    let mock_server = MockServer::start().await;
    let content = vec![0x5au8; 256 * 1024];

    Mock::given(method("GET"))
        .and(path("/large.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("large.bin");
    let (consumer, mut rx) = ChannelSink::pair();
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("{}/large.bin", mock_server.uri())),
        Arc::new(ReqwestTransport::new()),
        Arc::new(BackoffPolicy::default()),
        Arc::new(StreamingFileSink::new(&dest, Box::new(consumer))),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    let positions: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            RequestEvent::Progress { position, .. } => Some(*position),
            _ => None,
        })
        .collect();
    assert!(!positions.is_empty(), "expected progress events");
    assert!(
        positions.windows(2).all(|w| w[0] <= w[1]),
        "progress must be non-decreasing: {positions:?}"
    );
    assert_eq!(*positions.last().unwrap(), content.len() as u64);

    assert!(events.iter().any(|e| matches!(
        e,
        RequestEvent::Succeeded { status: 200, body: ResponseBody::File(path) } if path == &dest
    )));
    assert_eq!(
        std::fs::metadata(&dest).expect("file must exist").len(),
        content.len() as u64
    );
}

#[tokio::test]
async fn test_file_sink_404_fails_with_destination_file() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404).set_body_bytes(b"<html>not here</html>"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("missing.bin");
    let (consumer, mut rx) = ChannelSink::pair();
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("{}/missing.bin", mock_server.uri())),
        Arc::new(ReqwestTransport::new()),
        Arc::new(NoRetry),
        Arc::new(StreamingFileSink::new(&dest, Box::new(consumer))),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    assert!(
        !events.iter().any(|e| matches!(e, RequestEvent::Succeeded { .. })),
        "404 must not succeed: {events:?}"
    );
    let failed = events.iter().find_map(|e| match e {
        RequestEvent::Failed { message, body } => Some((message.clone(), body.clone())),
        _ => None,
    });
    match failed {
        Some((message, ResponseBody::File(path))) => {
            assert!(message.contains("404"), "Expected status in: {message}");
            assert_eq!(path, dest);
        }
        other => panic!("Expected Failed with file body, got: {other:?}"),
    }
    assert!(matches!(events.last(), Some(RequestEvent::Finished)));
}

#[tokio::test]
async fn test_connection_refused_reports_host_classification() {
    // Bind then drop a listener to get a port nothing is listening on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let (sink, mut rx) = ChannelSink::pair();
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("http://127.0.0.1:{port}/gone")),
        Arc::new(ReqwestTransport::new()),
        Arc::new(NoRetry),
        Arc::new(sink),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    let failed = events.iter().find_map(|e| match e {
        RequestEvent::Failed { message, .. } => Some(message.clone()),
        _ => None,
    });
    assert_eq!(
        failed.as_deref(),
        Some("can't resolve host"),
        "socket-level failures carry the host classification: {events:?}"
    );
    assert!(matches!(events.last(), Some(RequestEvent::Finished)));
}

#[tokio::test]
async fn test_error_status_is_a_sink_concern_not_a_transport_fault() {
    let mock_server = MockServer::start().await;

    // A 5xx response is still a completed exchange: the transport returns
    // it and the sink classifies it, without consuming the retry budget.
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_bytes(b"maintenance"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (sink, mut rx) = ChannelSink::pair();
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::with_timeouts(5, 10));
    let handle = RequestExecutor::spawn(
        RequestDescriptor::get(format!("{}/broken", mock_server.uri())),
        transport,
        Arc::new(BackoffPolicy::with_max_retries(5)),
        Arc::new(sink),
    );

    wait_until_finished(&handle).await;

    let events = drain(&mut rx);
    let failed = events.iter().find_map(|e| match e {
        RequestEvent::Failed { message, .. } => Some(message.clone()),
        _ => None,
    });
    assert!(
        failed.is_some_and(|m| m.contains("503")),
        "expected a status-derived failure: {events:?}"
    );
    assert!(matches!(events.last(), Some(RequestEvent::Finished)));
}
