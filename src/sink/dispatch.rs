use super::{SHUTDOWN_MARGIN, Sink};
use crate::domain::LogEvent;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

struct RegisteredSink {
    sink: Arc<dyn Sink>,
    failures: AtomicU64,
    panics: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailureSnapshot {
    pub name: String,
    pub failures: u64,
    pub panics: u64,
}

/// Hands each event to every registered sink, in registration order.
///
/// A failing or panicking sink is counted and skipped; it never affects the
/// other sinks or the caller.
#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<RegisteredSink>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn Sink>) {
        debug!(sink = sink.name(), "Registered sink");
        self.sinks.push(RegisteredSink {
            sink,
            failures: AtomicU64::new(0),
            panics: AtomicU64::new(0),
        });
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn dispatch(&self, event: LogEvent) {
        let event = Arc::new(event);
        for registered in &self.sinks {
            let outcome = catch_unwind(AssertUnwindSafe(|| registered.sink.accept(&event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let failures = registered.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        sink = registered.sink.name(),
                        failures,
                        "Sink rejected event: {}",
                        e
                    );
                }
                Err(_) => {
                    registered.panics.fetch_add(1, Ordering::Relaxed);
                    warn!(sink = registered.sink.name(), "Sink panicked while accepting event");
                }
            }
        }
    }

    pub fn failure_counts(&self) -> Vec<SinkFailureSnapshot> {
        self.sinks
            .iter()
            .map(|registered| SinkFailureSnapshot {
                name: registered.sink.name().to_string(),
                failures: registered.failures.load(Ordering::Relaxed),
                panics: registered.panics.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Shut every sink down concurrently. Each sink enforces `grace` itself;
    /// the outer bound only adds [`SHUTDOWN_MARGIN`] so leftovers get counted.
    pub async fn shutdown(&self, grace: Duration) {
        let shutdowns = self
            .sinks
            .iter()
            .map(|registered| registered.sink.shutdown(grace));
        let bound = grace + SHUTDOWN_MARGIN;
        if tokio::time::timeout(bound, futures::future::join_all(shutdowns))
            .await
            .is_err()
        {
            warn!(?grace, "Sink shutdown did not complete within grace period");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.failure_counts())
            .finish()
    }
}
