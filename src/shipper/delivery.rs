use super::RemoteSinkConfig;
use crate::buffer::{Batch, BatchFormer, IngressQueue};
use crate::domain::{LabelSet, LogEvent};
use crate::reliability::RetryConfig;
use crate::sender::{ShipperStats, Transport};
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, info, warn};

const DRAIN_CHUNK: usize = 1024;

/// How a batch left the shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Permanent failure, dropped without retry.
    Rejected,
    /// Transient failures until the retry budget ran out.
    Exhausted,
}

struct Completion {
    labels: LabelSet,
    events: usize,
    outcome: DeliveryOutcome,
}

/// Per-label-set delivery state. At most one batch is in flight; the rest
/// wait in FIFO order.
#[derive(Default)]
struct Lane {
    pending: VecDeque<Batch>,
    in_flight: Option<usize>,
}

impl Lane {
    fn pending_events(&self) -> usize {
        self.pending.iter().map(Batch::size).sum()
    }
}

/// Background half of a remote sink.
///
/// Owns batch formation and per-label-set delivery. Runs until the sink asks
/// it to shut down (or is dropped), then flushes within the grace period.
pub struct DeliveryLoop<T: Transport> {
    queue: Arc<IngressQueue>,
    transport: Arc<T>,
    stats: Arc<ShipperStats>,
    static_labels: LabelSet,
    label_properties: Vec<String>,
    retry: RetryConfig,
    max_pending_batches: usize,
    default_grace: Duration,
    former: BatchFormer,
    lanes: HashMap<LabelSet, Lane>,
    in_flight: JoinSet<Completion>,
    shutdown_rx: oneshot::Receiver<Duration>,
    done_tx: Option<oneshot::Sender<()>>,
}

impl<T: Transport> DeliveryLoop<T> {
    pub(super) fn new(
        config: &RemoteSinkConfig,
        queue: Arc<IngressQueue>,
        transport: Arc<T>,
        stats: Arc<ShipperStats>,
        shutdown_rx: oneshot::Receiver<Duration>,
        done_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            queue,
            transport,
            stats,
            static_labels: config.labels.clone(),
            label_properties: config.label_properties.clone(),
            retry: config.retry,
            max_pending_batches: config.max_pending_batches.max(1),
            default_grace: config.shutdown_grace_period,
            former: BatchFormer::new(config.batch),
            lanes: HashMap::new(),
            in_flight: JoinSet::new(),
            shutdown_rx,
            done_tx: Some(done_tx),
        }
    }

    pub async fn run(mut self) {
        debug!(labels = %self.static_labels, "Delivery loop started");

        let grace = loop {
            let deadline = self.former.next_deadline();

            tokio::select! {
                biased;

                signal = &mut self.shutdown_rx => {
                    break signal.unwrap_or(self.default_grace);
                }

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.complete(joined);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for batch in self.former.take_expired(Instant::now()) {
                        self.enqueue_batch(batch);
                    }
                }

                events = self.queue.recv_batch(DRAIN_CHUNK) => {
                    if events.is_empty() {
                        // Closed and empty: the sink is shutting down.
                        break (&mut self.shutdown_rx).await.unwrap_or(self.default_grace);
                    }
                    self.ingest(events);
                }
            }
        };

        self.shutdown(grace).await;
    }

    fn ingest(&mut self, events: Vec<Arc<LogEvent>>) {
        let now = Instant::now();
        for event in events {
            let labels = self.labels_for(&event);
            if let Some(batch) = self.former.add(labels, event, now) {
                self.enqueue_batch(batch);
            }
        }
    }

    fn labels_for(&self, event: &LogEvent) -> LabelSet {
        let mut labels = self.static_labels.clone();
        for name in &self.label_properties {
            if name == "level" {
                labels.push("level", event.level().label_value());
                continue;
            }
            match event.property(name) {
                Some(value) if !value.is_null() => labels.push(name.as_str(), value.to_string()),
                _ => {}
            }
        }
        labels
    }

    /// Hand a closed batch to its lane, starting delivery if the lane is idle.
    fn enqueue_batch(&mut self, batch: Batch) {
        let labels = batch.labels().clone();
        let lane = self.lanes.entry(labels).or_default();

        if lane.in_flight.is_none() {
            lane.in_flight = Some(batch.size());
            self.start_delivery(batch);
            return;
        }

        lane.pending.push_back(batch);
        if lane.pending.len() > self.max_pending_batches {
            if let Some(evicted) = lane.pending.pop_front() {
                self.stats.record_pending_eviction(evicted.size() as u64);
                warn!(
                    batch_id = %evicted.id(),
                    labels = %evicted.labels(),
                    entries = evicted.size(),
                    "Pending batch limit reached, dropped oldest batch"
                );
            }
        }
    }

    fn start_delivery(&mut self, batch: Batch) {
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let retry = self.retry;
        let labels = batch.labels().clone();
        let events = batch.size();

        self.in_flight.spawn(async move {
            let outcome = AssertUnwindSafe(deliver(transport.as_ref(), &batch, retry, &stats))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(batch_id = %batch.id(), "Transport panicked, dropping batch");
                    DeliveryOutcome::Rejected
                });
            Completion {
                labels,
                events,
                outcome,
            }
        });
    }

    fn complete(&mut self, joined: Result<Completion, JoinError>) {
        let completion = match joined {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "Delivery task ended abnormally");
                return;
            }
        };

        let events = completion.events as u64;
        match completion.outcome {
            DeliveryOutcome::Delivered => self.stats.record_delivered(events),
            DeliveryOutcome::Rejected => self.stats.record_failed_permanent(events),
            DeliveryOutcome::Exhausted => self.stats.record_failed_exhausted(events),
        }

        let next = match self.lanes.get_mut(&completion.labels) {
            Some(lane) => {
                lane.in_flight = None;
                lane.pending.pop_front()
            }
            None => None,
        };

        match next {
            Some(batch) => {
                if let Some(lane) = self.lanes.get_mut(&completion.labels) {
                    lane.in_flight = Some(batch.size());
                }
                self.start_delivery(batch);
            }
            None => {
                self.lanes.remove(&completion.labels);
            }
        }
    }

    async fn shutdown(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        self.queue.close();

        loop {
            let events = self.queue.try_drain(DRAIN_CHUNK);
            if events.is_empty() {
                break;
            }
            self.ingest(events);
        }
        for batch in self.former.drain_all() {
            self.enqueue_batch(batch);
        }

        let flushed = timeout_at(deadline, async {
            while let Some(joined) = self.in_flight.join_next().await {
                self.complete(joined);
            }
        })
        .await
        .is_ok();

        if !flushed {
            let leftover: usize = self
                .lanes
                .values()
                .map(|lane| lane.in_flight.unwrap_or(0) + lane.pending_events())
                .sum();
            self.in_flight.abort_all();
            self.lanes.clear();
            self.stats.record_dropped_shutdown(leftover as u64);
            warn!(
                leftover,
                ?grace,
                "Shutdown grace period expired, dropping undelivered events"
            );
        }

        let snapshot = self.stats.snapshot();
        info!(
            delivered = snapshot.events_delivered,
            dropped = snapshot.total_dropped(),
            "Remote sink stopped"
        );

        if let Some(done) = self.done_tx.take() {
            let _ = done.send(());
        }
    }
}

/// Push a batch, retrying transient failures per `retry`.
async fn deliver<T: Transport>(
    transport: &T,
    batch: &Batch,
    retry: RetryConfig,
    stats: &ShipperStats,
) -> DeliveryOutcome {
    let started = Instant::now();
    let mut retries = 0;

    loop {
        let error = match transport.push(batch).await {
            Ok(_) => return DeliveryOutcome::Delivered,
            Err(e) => e,
        };

        if !error.is_transient() {
            warn!(
                batch_id = %batch.id(),
                entries = batch.size(),
                error = %error,
                "Batch rejected, dropping without retry"
            );
            return DeliveryOutcome::Rejected;
        }

        let delay = retry.calculate_delay(retries);
        if !retry.should_retry(retries, started.elapsed(), delay) {
            warn!(
                batch_id = %batch.id(),
                entries = batch.size(),
                attempts = retries + 1,
                error = %error,
                "Retries exhausted, dropping batch"
            );
            return DeliveryOutcome::Exhausted;
        }

        debug!(
            batch_id = %batch.id(),
            attempt = retries + 1,
            ?delay,
            error = %error,
            "Transient delivery failure, retrying"
        );
        stats.record_retry();
        sleep(delay).await;
        retries += 1;
    }
}
