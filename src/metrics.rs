//! Prometheus view of the pipeline and shipper counters.
//!
//! The counters live in plain atomics; this module copies a snapshot into a
//! registry on demand and renders it in the text exposition format.

use crate::pipeline::PipelineStats;
use crate::sender::ShipperStatsSnapshot;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub struct PipelineMetrics {
    registry: Registry,
    events: IntGaugeVec,
    enricher_panics: IntGauge,
    shipped_events: IntGaugeVec,
    shipped_batches: IntGaugeVec,
    retry_attempts: IntGauge,
}

fn gauge(u: u64) -> i64 {
    i64::try_from(u).unwrap_or(i64::MAX)
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let events = IntGaugeVec::new(
            Opts::new("rask_pipeline_events_total", "Events seen by the pipeline by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let enricher_panics = IntGauge::new(
            "rask_pipeline_enricher_panics_total",
            "Enricher panics contained by the pipeline",
        )?;
        registry.register(Box::new(enricher_panics.clone()))?;

        let shipped_events = IntGaugeVec::new(
            Opts::new("rask_shipper_events_total", "Remote sink events by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(shipped_events.clone()))?;

        let shipped_batches = IntGaugeVec::new(
            Opts::new("rask_shipper_batches_total", "Remote sink batches by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(shipped_batches.clone()))?;

        let retry_attempts = IntGauge::new(
            "rask_shipper_retry_attempts_total",
            "Retries of transient push failures",
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        Ok(Self {
            registry,
            events,
            enricher_panics,
            shipped_events,
            shipped_batches,
            retry_attempts,
        })
    }

    pub fn observe_pipeline(&self, stats: &PipelineStats) {
        for (outcome, value) in [
            ("dispatched", stats.dispatched),
            ("filtered", stats.filtered),
            ("recursive_dropped", stats.recursive_dropped),
            ("dropped_after_shutdown", stats.dropped_after_shutdown),
        ] {
            self.events.with_label_values(&[outcome]).set(gauge(value));
        }
        self.enricher_panics.set(gauge(stats.enricher_panics));
    }

    pub fn observe_shipper(&self, stats: &ShipperStatsSnapshot) {
        for (outcome, value) in [
            ("enqueued", stats.enqueued),
            ("dropped_overflow", stats.dropped_overflow),
            ("dropped_shutdown", stats.dropped_shutdown),
            ("dropped_pending_overflow", stats.dropped_pending_overflow),
            ("delivered", stats.events_delivered),
            ("failed", stats.events_failed),
        ] {
            self.shipped_events.with_label_values(&[outcome]).set(gauge(value));
        }
        for (outcome, value) in [
            ("delivered", stats.batches_delivered),
            ("failed_permanent", stats.batches_failed_permanent),
            ("failed_exhausted", stats.batches_failed_exhausted),
            ("dropped_pending", stats.batches_dropped_pending),
        ] {
            self.shipped_batches.with_label_values(&[outcome]).set(gauge(value));
        }
        self.retry_attempts.set(gauge(stats.retry_attempts));
    }

    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics").finish_non_exhaustive()
    }
}
