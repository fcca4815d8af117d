use parking_lot::Mutex;
use rask_log_pipeline::buffer::{Batch, BatchConfig, OverflowPolicy};
use rask_log_pipeline::reliability::RetryConfig;
use rask_log_pipeline::sender::{Transport, TransmissionError, TransmissionResult};
use rask_log_pipeline::shipper::{RemoteSink, RemoteSinkConfig};
use rask_log_pipeline::sink::Sink;
use rask_log_pipeline::{LabelSet, LogEvent, LogLevel, Properties};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

fn delivered() -> TransmissionResult {
    TransmissionResult {
        status_code: 204,
        latency: Duration::ZERO,
        bytes_sent: 0,
        compressed: false,
    }
}

fn event(n: i64) -> Arc<LogEvent> {
    Arc::new(
        LogEvent::builder()
            .level(LogLevel::Information)
            .template("event {N}")
            .property("N", n)
            .build(),
    )
}

#[derive(Clone, Default)]
struct Recording {
    batches: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl Recording {
    fn batches(&self) -> Vec<(String, Vec<String>)> {
        self.batches.lock().clone()
    }

    fn messages(&self) -> Vec<String> {
        self.batches().into_iter().flat_map(|(_, m)| m).collect()
    }
}

impl Transport for Recording {
    async fn push(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        let messages = batch.entries().iter().map(|e| e.render()).collect();
        self.batches
            .lock()
            .push((batch.labels().to_string(), messages));
        Ok(delivered())
    }
}

/// Blocks every push until a permit is released.
#[derive(Clone)]
struct Gated {
    gate: Arc<Semaphore>,
    inner: Recording,
}

impl Transport for Gated {
    async fn push(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.inner.push(batch).await
    }
}

/// Fails every push with the given status.
#[derive(Clone)]
struct Failing {
    status: u16,
    attempts: Arc<AtomicUsize>,
}

impl Transport for Failing {
    async fn push(&self, _batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransmissionError::Status {
            status: self.status,
            body: String::new(),
        })
    }
}

/// Never finishes a push.
struct Hanging;

impl Transport for Hanging {
    async fn push(&self, _batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        std::future::pending().await
    }
}

fn config(max_events: usize, max_age: Duration) -> RemoteSinkConfig {
    RemoteSinkConfig {
        labels: LabelSet::default().with("app", "test"),
        batch: BatchConfig { max_events, max_age },
        queue_capacity: 1024,
        retry: RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_retry_window: None,
            jitter: false,
        },
        ..RemoteSinkConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_batch_closes_at_max_events() {
    let transport = Recording::default();
    let sink = RemoteSink::spawn(
        &config(3, Duration::from_secs(60)),
        transport.clone(),
        &Handle::current(),
    )
    .unwrap();

    for n in 0..7 {
        sink.accept(&event(n)).unwrap();
    }
    wait_until(|| transport.batches().len() == 2).await;
    sink.close(Duration::from_secs(2)).await;

    let sizes: Vec<usize> = transport.batches().iter().map(|(_, m)| m.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(
        transport.messages(),
        (0..7).map(|n| format!("event {n}")).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_batch_closes_at_max_age() {
    let transport = Recording::default();
    let sink = RemoteSink::spawn(
        &config(100, Duration::from_millis(100)),
        transport.clone(),
        &Handle::current(),
    )
    .unwrap();

    sink.accept(&event(1)).unwrap();
    sink.accept(&event(2)).unwrap();
    assert!(transport.batches().is_empty());

    wait_until(|| transport.batches().len() == 1).await;
    assert_eq!(transport.batches()[0].1.len(), 2);
    assert_eq!(sink.stats().events_delivered, 2);
    sink.close(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_level_label_splits_streams() {
    let transport = Recording::default();
    let mut config = config(10, Duration::from_secs(60));
    config.label_properties = vec!["level".to_string(), "Tenant".to_string()];
    let sink = RemoteSink::spawn(&config, transport.clone(), &Handle::current()).unwrap();

    let info = LogEvent::builder()
        .level(LogLevel::Information)
        .template("a")
        .property("Tenant", "acme")
        .build();
    let error = LogEvent::builder().level(LogLevel::Error).template("b").build();
    sink.accept(&Arc::new(info)).unwrap();
    sink.accept(&Arc::new(error)).unwrap();
    sink.close(Duration::from_secs(2)).await;

    let mut labels: Vec<String> = transport.batches().into_iter().map(|(l, _)| l).collect();
    labels.sort();
    assert_eq!(
        labels,
        vec![
            r#"{app="test", level="error"}"#.to_string(),
            r#"{app="test", level="info", Tenant="acme"}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_drop_newest_keeps_first_events_in_order() {
    let transport = Recording::default();
    let mut config = config(100, Duration::from_secs(60));
    config.queue_capacity = 5;
    config.overflow_policy = OverflowPolicy::DropNewest;

    let (sink, delivery) = RemoteSink::new(&config, transport.clone()).unwrap();
    for n in 0..5 {
        sink.accept(&event(n)).unwrap();
    }
    assert!(sink.accept(&event(5)).is_ok());
    assert_eq!(sink.stats().dropped_overflow, 1);
    assert_eq!(sink.stats().enqueued, 5);

    tokio::spawn(delivery.run());
    sink.close(Duration::from_secs(2)).await;

    assert_eq!(
        transport.messages(),
        (0..5).map(|n| format!("event {n}")).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_block_with_timeout_gives_up_when_full() {
    let mut config = config(100, Duration::from_secs(60));
    config.queue_capacity = 1;
    config.overflow_policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(20));

    let (sink, _delivery) = RemoteSink::new(&config, Recording::default()).unwrap();
    sink.accept(&event(0)).unwrap();

    let started = std::time::Instant::now();
    assert!(sink.accept(&event(1)).is_ok());
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(sink.stats().dropped_overflow, 1);
}

#[tokio::test]
async fn test_pending_overflow_drops_oldest_batch() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Gated {
        gate: Arc::clone(&gate),
        inner: Recording::default(),
    };
    let mut config = config(1, Duration::from_secs(60));
    config.max_pending_batches = 2;

    let (sink, delivery) = RemoteSink::new(&config, transport.clone()).unwrap();
    for n in 0..4 {
        sink.accept(&event(n)).unwrap();
    }
    tokio::spawn(delivery.run());

    wait_until(|| sink.stats().batches_dropped_pending == 1).await;
    gate.add_permits(16);
    sink.close(Duration::from_secs(2)).await;

    assert_eq!(
        transport.inner.messages(),
        vec!["event 0", "event 2", "event 3"]
    );
    let stats = sink.stats();
    assert_eq!(stats.dropped_pending_overflow, 1);
    assert_eq!(stats.batches_delivered, 3);
}

#[tokio::test]
async fn test_one_batch_in_flight_per_label_set() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Gated {
        gate: Arc::clone(&gate),
        inner: Recording::default(),
    };
    let (sink, delivery) =
        RemoteSink::new(&config(1, Duration::from_secs(60)), transport.clone()).unwrap();
    for n in 0..3 {
        sink.accept(&event(n)).unwrap();
    }
    tokio::spawn(delivery.run());

    // Each release lets exactly one batch through, in order.
    for expected in 1..=3 {
        gate.add_permits(1);
        wait_until(|| transport.inner.batches().len() == expected).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.inner.batches().len(), expected);
    }
    sink.close(Duration::from_secs(1)).await;
    assert_eq!(
        transport.inner.messages(),
        vec!["event 0", "event 1", "event 2"]
    );
}

#[tokio::test]
async fn test_transient_failures_retry_then_give_up() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let transport = Failing {
        status: 503,
        attempts: Arc::clone(&attempts),
    };
    let sink = RemoteSink::spawn(
        &config(1, Duration::from_secs(60)),
        transport,
        &Handle::current(),
    )
    .unwrap();

    sink.accept(&event(0)).unwrap();
    wait_until(|| sink.stats().batches_failed_exhausted == 1).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = sink.stats();
    assert_eq!(stats.retry_attempts, 2);
    assert_eq!(stats.events_failed, 1);
    sink.close(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let transport = Failing {
        status: 400,
        attempts: Arc::clone(&attempts),
    };
    let sink = RemoteSink::spawn(
        &config(1, Duration::from_secs(60)),
        transport,
        &Handle::current(),
    )
    .unwrap();

    sink.accept(&event(0)).unwrap();
    wait_until(|| sink.stats().batches_failed_permanent == 1).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(sink.stats().retry_attempts, 0);
    sink.close(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_retry_window_limits_attempts() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let transport = Failing {
        status: 500,
        attempts: Arc::clone(&attempts),
    };
    let mut config = config(1, Duration::from_secs(60));
    config.retry = RetryConfig {
        max_retries: 10,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(1),
        max_retry_window: Some(Duration::from_millis(75)),
        jitter: false,
    };
    let sink = RemoteSink::spawn(&config, transport, &Handle::current()).unwrap();

    sink.accept(&event(0)).unwrap();
    wait_until(|| sink.stats().batches_failed_exhausted == 1).await;

    // 0ms + 50ms fits the window; ~50ms + 100ms does not.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    sink.close(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_shutdown_grace_expiry_counts_leftovers() {
    let sink = RemoteSink::spawn(
        &config(10, Duration::from_secs(60)),
        Hanging,
        &Handle::current(),
    )
    .unwrap();
    for n in 0..3 {
        sink.accept(&event(n)).unwrap();
    }

    let started = std::time::Instant::now();
    sink.close(Duration::from_millis(100)).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    let stats = sink.stats();
    assert_eq!(stats.dropped_shutdown, 3);
    assert_eq!(stats.events_delivered, 0);
}

#[tokio::test]
async fn test_pipeline_shutdown_waits_for_leftovers_to_be_counted() {
    let sink = Arc::new(
        RemoteSink::spawn(
            &config(10, Duration::from_secs(60)),
            Hanging,
            &Handle::current(),
        )
        .unwrap(),
    );
    let pipeline = rask_log_pipeline::Pipeline::builder()
        .write_to_shared(Arc::clone(&sink) as Arc<dyn Sink>)
        .build();

    for n in 0..3_i64 {
        pipeline.write(LogLevel::Information, "App", "event {N}", || {
            Properties::new().add("N", n)
        });
    }
    pipeline.shutdown(Duration::from_millis(100)).await;

    // Counted before shutdown returns, not some time after.
    let stats = sink.stats();
    assert_eq!(stats.dropped_shutdown, 3);
    assert_eq!(stats.events_delivered, 0);
}

#[tokio::test]
async fn test_overflow_drops_are_not_sink_failures() {
    let mut config = config(100, Duration::from_secs(60));
    config.queue_capacity = 2;
    let (sink, _delivery) = RemoteSink::new(&config, Recording::default()).unwrap();
    let sink = Arc::new(sink);
    let pipeline = rask_log_pipeline::Pipeline::builder()
        .write_to_shared(Arc::clone(&sink) as Arc<dyn Sink>)
        .build();

    for n in 0..5_i64 {
        pipeline.write(LogLevel::Information, "App", "event {N}", || {
            Properties::new().add("N", n)
        });
    }

    assert_eq!(sink.stats().dropped_overflow, 3);
    assert_eq!(pipeline.stats().dispatched, 5);
    let failures = pipeline.sink_failures();
    assert_eq!(failures[0].failures, 0);
}

#[tokio::test]
async fn test_pipeline_shutdown_flushes_remote_sink() {
    let transport = Recording::default();
    let sink = Arc::new(
        RemoteSink::spawn(
            &config(100, Duration::from_secs(60)),
            transport.clone(),
            &Handle::current(),
        )
        .unwrap(),
    );
    let pipeline = rask_log_pipeline::Pipeline::builder()
        .write_to_shared(Arc::clone(&sink) as Arc<dyn Sink>)
        .build();

    for n in 0..4_i64 {
        pipeline.write(LogLevel::Warning, "App", "event {N}", || {
            Properties::new().add("N", n)
        });
    }
    pipeline.shutdown(Duration::from_secs(2)).await;

    assert_eq!(transport.messages().len(), 4);
    assert_eq!(sink.stats().events_delivered, 4);

    pipeline.write(LogLevel::Warning, "App", "late", Properties::new);
    assert_eq!(pipeline.stats().dropped_after_shutdown, 1);
}
