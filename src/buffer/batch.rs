use crate::domain::{LabelSet, LogEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Why a batch was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchType {
    SizeBased,
    TimeBased,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_events: usize,
    pub max_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            max_age: Duration::from_secs(2),
        }
    }
}

/// Closed, immutable group of events that share one label set.
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    labels: LabelSet,
    entries: Vec<Arc<LogEvent>>,
    batch_type: BatchType,
    opened_at: Instant,
}

impl Batch {
    pub fn new(labels: LabelSet, entries: Vec<Arc<LogEvent>>, batch_type: BatchType) -> Self {
        Self {
            id: Uuid::new_v4(),
            labels,
            entries,
            batch_type,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<LogEvent>] {
        &self.entries
    }

    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    /// When the first event was added.
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

struct OpenBatch {
    entries: Vec<Arc<LogEvent>>,
    opened_at: Instant,
}

impl OpenBatch {
    fn close(self, labels: LabelSet, batch_type: BatchType) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            labels,
            entries: self.entries,
            batch_type,
            opened_at: self.opened_at,
        }
    }
}

/// Groups events into per-label-set batches.
///
/// Owned by the delivery loop, so it needs no locking. A batch is opened by
/// the first event for its label set and closed when it reaches
/// `max_events` or when `max_age` has passed since it was opened.
pub struct BatchFormer {
    config: BatchConfig,
    open: HashMap<LabelSet, OpenBatch>,
}

impl BatchFormer {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: BatchConfig {
                max_events: config.max_events.max(1),
                ..config
            },
            open: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Add an event; returns the batch if this event filled it.
    pub fn add(&mut self, labels: LabelSet, event: Arc<LogEvent>, now: Instant) -> Option<Batch> {
        let len = match self.open.get_mut(&labels) {
            Some(open) => {
                open.entries.push(event);
                open.entries.len()
            }
            None => {
                let mut entries = Vec::with_capacity(self.config.max_events.min(1024));
                entries.push(event);
                self.open.insert(
                    labels.clone(),
                    OpenBatch {
                        entries,
                        opened_at: now,
                    },
                );
                1
            }
        };

        if len >= self.config.max_events {
            self.open
                .remove(&labels)
                .map(|open| open.close(labels, BatchType::SizeBased))
        } else {
            None
        }
    }

    /// Earliest instant at which an open batch expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open
            .values()
            .map(|open| open.opened_at + self.config.max_age)
            .min()
    }

    /// Close every batch whose age has reached `max_age`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Batch> {
        let max_age = self.config.max_age;
        let expired: Vec<LabelSet> = self
            .open
            .iter()
            .filter(|(_, open)| open.opened_at + max_age <= now)
            .map(|(labels, _)| labels.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|labels| {
                self.open
                    .remove(&labels)
                    .map(|open| open.close(labels, BatchType::TimeBased))
            })
            .collect()
    }

    /// Close everything regardless of age.
    pub fn drain_all(&mut self) -> Vec<Batch> {
        self.open
            .drain()
            .map(|(labels, open)| open.close(labels, BatchType::Shutdown))
            .collect()
    }

    pub fn open_batches(&self) -> usize {
        self.open.len()
    }

    pub fn open_events(&self) -> usize {
        self.open.values().map(|open| open.entries.len()).sum()
    }
}
