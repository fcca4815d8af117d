use flate2::read::GzDecoder;
use rask_log_pipeline::buffer::BatchConfig;
use rask_log_pipeline::reliability::RetryConfig;
use rask_log_pipeline::sender::{BatchSerializer, ClientConfig, HttpClient, HttpTransport, LineFormat};
use rask_log_pipeline::shipper::{RemoteSink, RemoteSinkConfig};
use rask_log_pipeline::sink::Sink;
use rask_log_pipeline::{LabelSet, LogEvent, LogLevel};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUSH_PATH: &str = "/loki/api/v1/push";

fn transport(server: &MockServer, line_format: LineFormat, compress: bool) -> HttpTransport {
    let client = HttpClient::new(ClientConfig {
        endpoint: server.uri(),
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    })
    .unwrap();
    HttpTransport::new(client, BatchSerializer::new(line_format, compress))
}

fn sink_config(max_events: usize, max_retries: u32) -> RemoteSinkConfig {
    RemoteSinkConfig {
        labels: LabelSet::default()
            .with("app", "rask-test")
            .with("environment", "local"),
        batch: BatchConfig {
            max_events,
            max_age: Duration::from_secs(60),
        },
        retry: RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            max_retry_window: None,
            jitter: false,
        },
        ..RemoteSinkConfig::default()
    }
}

fn event(message: &str) -> Arc<LogEvent> {
    Arc::new(
        LogEvent::builder()
            .level(LogLevel::Information)
            .source_context("App.Http")
            .template("{Message}")
            .property("Message", message)
            .build(),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 3s");
}

#[tokio::test]
async fn test_batch_is_pushed_as_loki_streams() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RemoteSink::spawn(
        &sink_config(2, 0),
        transport(&server, LineFormat::Text, false),
        &Handle::current(),
    )
    .unwrap();
    assert_ok!(sink.accept(&event("hello 1")));
    assert_ok!(sink.accept(&event("hello 2")));
    wait_until(|| sink.stats().batches_delivered == 1).await;
    sink.close(Duration::from_secs(1)).await;

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let stream = &body["streams"][0];
    assert_eq!(stream["stream"]["app"], "rask-test");
    assert_eq!(stream["stream"]["environment"], "local");

    let values = stream["values"].as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0][1], "hello 1");
    assert_eq!(values[1][1], "hello 2");
    let nanos: i64 = values[0][0].as_str().unwrap().parse().unwrap();
    assert!(nanos > 1_600_000_000_000_000_000);
}

#[tokio::test]
async fn test_gzip_json_lines() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .and(header("content-encoding", "gzip"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RemoteSink::spawn(
        &sink_config(1, 0),
        transport(&server, LineFormat::Json, true),
        &Handle::current(),
    )
    .unwrap();
    sink.accept(&event("compressed")).unwrap();
    wait_until(|| sink.stats().batches_delivered == 1).await;
    sink.close(Duration::from_secs(1)).await;

    let requests = server.received_requests().await.unwrap();
    let mut json = String::new();
    GzDecoder::new(requests[0].body.as_slice())
        .read_to_string(&mut json)
        .unwrap();
    let body: Value = serde_json::from_str(&json).unwrap();
    let line: Value =
        serde_json::from_str(body["streams"][0]["values"][0][1].as_str().unwrap()).unwrap();
    assert_eq!(line["message"], "compressed");
    assert_eq!(line["messageTemplate"], "{Message}");
    assert_eq!(line["level"], "Information");
    assert_eq!(line["sourceContext"], "App.Http");
}

#[tokio::test]
async fn test_server_errors_are_retried_until_budget_runs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let sink = RemoteSink::spawn(
        &sink_config(1, 2),
        transport(&server, LineFormat::Text, false),
        &Handle::current(),
    )
    .unwrap();
    sink.accept(&event("doomed")).unwrap();
    wait_until(|| sink.stats().batches_failed_exhausted == 1).await;
    sink.close(Duration::from_secs(1)).await;

    let stats = sink.stats();
    assert_eq!(stats.retry_attempts, 2);
    assert_eq!(stats.events_failed, 1);
    assert_eq!(stats.events_delivered, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_bad_request_is_dropped_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("entry out of order"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RemoteSink::spawn(
        &sink_config(1, 5),
        transport(&server, LineFormat::Text, false),
        &Handle::current(),
    )
    .unwrap();
    sink.accept(&event("rejected")).unwrap();
    wait_until(|| sink.stats().batches_failed_permanent == 1).await;
    sink.close(Duration::from_secs(1)).await;

    assert_eq!(sink.stats().retry_attempts, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RemoteSink::spawn(
        &sink_config(1, 3),
        transport(&server, LineFormat::Text, false),
        &Handle::current(),
    )
    .unwrap();
    sink.accept(&event("eventually")).unwrap();
    wait_until(|| sink.stats().batches_delivered == 1).await;
    sink.close(Duration::from_secs(1)).await;

    assert_eq!(sink.stats().retry_attempts, 1);
    server.verify().await;
}
