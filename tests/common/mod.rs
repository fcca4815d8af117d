#![allow(dead_code)]

use parking_lot::Mutex;
use rask_log_pipeline::LogEvent;
use rask_log_pipeline::sink::{Sink, SinkError};
use std::sync::Arc;

/// Keeps every accepted event.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Arc<LogEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Arc<LogEvent>> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

impl Sink for CollectingSink {
    fn accept(&self, event: &Arc<LogEvent>) -> Result<(), SinkError> {
        self.events.lock().push(Arc::clone(event));
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

pub fn as_sink(sink: &Arc<CollectingSink>) -> Arc<dyn Sink> {
    Arc::clone(sink) as Arc<dyn Sink>
}
