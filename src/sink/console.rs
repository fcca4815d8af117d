use super::{Sink, SinkError};
use crate::domain::LogEvent;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Writes one human-readable line per event.
///
/// Format: `[HH:MM:SS LVL] message {Name=value ...}`, followed by an
/// exception line when the event carries one. Lines from concurrent callers
/// never interleave.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    writer: Mutex<W>,
    selected: Vec<String>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ConsoleSink<io::Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            selected: Vec::new(),
        }
    }

    /// Properties to print after the message, in this order.
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn format_event(&self, event: &LogEvent) -> String {
        let mut line = String::with_capacity(64);
        let _ = write!(
            line,
            "[{} {}] {}",
            event.timestamp().format("%H:%M:%S"),
            event.level().short_code(),
            event.render()
        );

        let mut first = true;
        for name in &self.selected {
            let Some(value) = event.property(name) else {
                continue;
            };
            line.push_str(if first { " {" } else { " " });
            first = false;
            let _ = write!(line, "{name}={value}");
        }
        if !first {
            line.push('}');
        }
        line.push('\n');

        if let Some(exception) = event.exception() {
            let _ = writeln!(line, "{exception}");
        }
        line
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    pub fn with_writer<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&self.writer.lock())
    }
}

impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn accept(&self, event: &Arc<LogEvent>) -> Result<(), SinkError> {
        let line = self.format_event(event);
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn shutdown(&self, _grace: Duration) -> BoxFuture<'_, ()> {
        let _ = self.writer.lock().flush();
        Box::pin(futures::future::ready(()))
    }
}
