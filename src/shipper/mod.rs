//! Remote batch shipper.
//!
//! `RemoteSink` is the synchronous half: `accept` only pushes onto the
//! bounded ingress queue. `DeliveryLoop` is the async half that forms
//! per-label-set batches and pushes them through a [`Transport`].

pub mod delivery;

pub use delivery::{DeliveryLoop, DeliveryOutcome};

use crate::buffer::{BatchConfig, BufferError, IngressQueue, OverflowPolicy};
use crate::domain::{LabelSet, LogEvent};
use crate::reliability::RetryConfig;
use crate::sender::{ShipperStats, ShipperStatsSnapshot, Transport};
use crate::sink::{SHUTDOWN_MARGIN, Sink, SinkError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RemoteSinkConfig {
    /// Static stream labels, always first in every label set.
    pub labels: LabelSet,
    /// Event properties promoted to labels. `level` means the event level.
    pub label_properties: Vec<String>,
    pub batch: BatchConfig,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub retry: RetryConfig,
    pub max_pending_batches: usize,
    pub shutdown_grace_period: Duration,
}

impl Default for RemoteSinkConfig {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
            label_properties: Vec::new(),
            batch: BatchConfig::default(),
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::DropNewest,
            retry: RetryConfig::default(),
            max_pending_batches: 16,
            shutdown_grace_period: Duration::from_secs(5),
        }
    }
}

pub struct RemoteSink {
    name: String,
    queue: Arc<IngressQueue>,
    stats: Arc<ShipperStats>,
    shutdown_tx: Mutex<Option<oneshot::Sender<Duration>>>,
    done_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl RemoteSink {
    /// Build the sink and its delivery loop without starting the loop.
    pub fn new<T: Transport>(
        config: &RemoteSinkConfig,
        transport: T,
    ) -> Result<(Self, DeliveryLoop<T>), BufferError> {
        let queue = Arc::new(IngressQueue::new(config.queue_capacity, config.overflow_policy)?);
        let stats = Arc::new(ShipperStats::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let delivery = DeliveryLoop::new(
            config,
            Arc::clone(&queue),
            Arc::new(transport),
            Arc::clone(&stats),
            shutdown_rx,
            done_tx,
        );

        let sink = Self {
            name: format!("remote{}", config.labels),
            queue,
            stats,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            done_rx: Mutex::new(Some(done_rx)),
        };
        Ok((sink, delivery))
    }

    /// Build the sink and start its delivery loop on `handle`.
    pub fn spawn<T: Transport>(
        config: &RemoteSinkConfig,
        transport: T,
        handle: &Handle,
    ) -> Result<Self, BufferError> {
        let (sink, delivery) = Self::new(config, transport)?;
        handle.spawn(delivery.run());
        Ok(sink)
    }

    pub fn stats(&self) -> ShipperStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting, flush within `grace`, and wait for the loop to finish.
    pub async fn close(&self, grace: Duration) {
        self.queue.close();

        let Some(shutdown_tx) = self.shutdown_tx.lock().take() else {
            debug!(sink = %self.name, "Remote sink already shut down");
            return;
        };
        let _ = shutdown_tx.send(grace);

        let done_rx = self.done_rx.lock().take();
        if let Some(done_rx) = done_rx {
            // The loop enforces `grace` itself; the margin only covers scheduling.
            if tokio::time::timeout(grace + SHUTDOWN_MARGIN, done_rx)
                .await
                .is_err()
            {
                warn!(sink = %self.name, "Delivery loop did not stop in time");
            }
        }
    }
}

impl Sink for RemoteSink {
    fn accept(&self, event: &Arc<LogEvent>) -> Result<(), SinkError> {
        match self.queue.push(Arc::clone(event)) {
            Ok(()) => {
                self.stats.record_enqueued();
                Ok(())
            }
            Err(BufferError::BufferClosed) => {
                self.stats.record_dropped_shutdown(1);
                Err(SinkError::Closed)
            }
            // Overflow drops are counted here, not reported as sink failures.
            Err(e) if e.is_overflow() => {
                self.stats.record_dropped_overflow();
                Ok(())
            }
            Err(e) => Err(SinkError::Rejected(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn shutdown(&self, grace: Duration) -> BoxFuture<'_, ()> {
        Box::pin(self.close(grace))
    }
}

impl std::fmt::Debug for RemoteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSink")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
