pub mod console;
pub mod dispatch;

pub use console::ConsoleSink;
pub use dispatch::{Dispatcher, SinkFailureSnapshot};

use crate::domain::LogEvent;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink is closed")]
    Closed,
    #[error("Sink rejected event: {0}")]
    Rejected(String),
}

/// Extra time allowed past a shutdown grace period for a sink's background
/// task to report what it could not deliver.
pub const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Destination for accepted events.
///
/// `accept` is called on the emitting thread and must not block on I/O it
/// does not own. Sinks that need background work (like the remote shipper)
/// hand the event off and do the work elsewhere.
pub trait Sink: Send + Sync {
    fn accept(&self, event: &Arc<LogEvent>) -> Result<(), SinkError>;

    fn name(&self) -> &str;

    /// Flush and release resources, taking at most `grace`.
    fn shutdown(&self, _grace: Duration) -> BoxFuture<'_, ()> {
        Box::pin(futures::future::ready(()))
    }
}
