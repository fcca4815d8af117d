//! Entry point for call sites.
//!
//! A [`Pipeline`] owns the level filter, the enricher chain and the sink
//! dispatcher. Build one with [`PipelineBuilder`], pass it by reference to
//! whatever logs, and call [`Pipeline::shutdown`] once before exit.

pub mod builder;
pub mod global;

pub use builder::PipelineBuilder;

use crate::domain::{ExceptionInfo, LogEvent, LogLevel, MessageTemplate, Properties};
use crate::enrich::EnricherChain;
use crate::filter::LevelFilter;
use crate::sink::{Dispatcher, SinkFailureSnapshot};
use serde::Serialize;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

thread_local! {
    static EMITTING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the pipeline until dropped.
struct EmitGuard;

impl EmitGuard {
    fn enter() -> Option<Self> {
        EMITTING.with(|emitting| {
            if emitting.replace(true) {
                None
            } else {
                Some(EmitGuard)
            }
        })
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        EMITTING.with(|emitting| emitting.set(false));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub dispatched: u64,
    pub filtered: u64,
    pub recursive_dropped: u64,
    pub dropped_after_shutdown: u64,
    pub enricher_panics: u64,
}

pub struct Pipeline {
    filter: LevelFilter,
    enrichers: EnricherChain,
    dispatcher: Dispatcher,
    closed: AtomicBool,
    dispatched: AtomicU64,
    filtered: AtomicU64,
    recursive_dropped: AtomicU64,
    dropped_after_shutdown: AtomicU64,
    recursion_warned: AtomicBool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn from_parts(
        filter: LevelFilter,
        enrichers: EnricherChain,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            filter,
            enrichers,
            dispatcher,
            closed: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            recursive_dropped: AtomicU64::new(0),
            dropped_after_shutdown: AtomicU64::new(0),
            recursion_warned: AtomicBool::new(false),
        }
    }

    /// Cheap check meant to run before any event or property is built.
    #[inline]
    pub fn is_enabled(&self, source_context: &str, level: LogLevel) -> bool {
        self.filter.is_enabled(source_context, level)
    }

    /// Filter, enrich and dispatch a prebuilt event.
    pub fn emit(&self, event: LogEvent) {
        if !self.filter.admits(&event) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.emit_admitted(event);
    }

    /// Build and emit an event. `properties` is only called when the level
    /// is enabled for `source_context`.
    pub fn write<F>(
        &self,
        level: LogLevel,
        source_context: &str,
        template: impl Into<MessageTemplate>,
        properties: F,
    ) where
        F: FnOnce() -> Properties,
    {
        if !self.is_enabled(source_context, level) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let event = LogEvent::new(level, source_context, template, properties());
        self.emit_admitted(event);
    }

    /// Like [`Pipeline::write`], with an attached exception.
    pub fn write_exception<F>(
        &self,
        level: LogLevel,
        source_context: &str,
        exception: ExceptionInfo,
        template: impl Into<MessageTemplate>,
        properties: F,
    ) where
        F: FnOnce() -> Properties,
    {
        if !self.is_enabled(source_context, level) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let event = LogEvent::builder()
            .level(level)
            .source_context(source_context)
            .template(template)
            .properties(properties())
            .exception(exception)
            .build();
        self.emit_admitted(event);
    }

    fn emit_admitted(&self, event: LogEvent) {
        if self.closed.load(Ordering::Acquire) {
            self.dropped_after_shutdown.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(_guard) = EmitGuard::enter() else {
            self.recursive_dropped.fetch_add(1, Ordering::Relaxed);
            if !self.recursion_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    source_context = event.source_context(),
                    "Dropped event emitted from inside the pipeline; further occurrences are only counted"
                );
            }
            return;
        };

        let event = self.enrichers.apply(event);
        self.dispatcher.dispatch(event);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Logger bound to one source context.
    pub fn for_context<'a>(&'a self, source_context: &'a str) -> SourceLogger<'a> {
        SourceLogger {
            pipeline: self,
            source_context,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            recursive_dropped: self.recursive_dropped.load(Ordering::Relaxed),
            dropped_after_shutdown: self.dropped_after_shutdown.load(Ordering::Relaxed),
            enricher_panics: self.enrichers.panic_count(),
        }
    }

    pub fn sink_failures(&self) -> Vec<SinkFailureSnapshot> {
        self.dispatcher.failure_counts()
    }

    pub fn filter(&self) -> &LevelFilter {
        &self.filter
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting events and flush every sink within `grace`.
    ///
    /// Only the first call does any work.
    pub async fn shutdown(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(?grace, sinks = self.dispatcher.len(), "Shutting down pipeline");
        self.dispatcher.shutdown(grace).await;
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("filter", &self.filter)
            .field("enrichers", &self.enrichers)
            .field("dispatcher", &self.dispatcher)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Borrowed logger that stamps every event with one source context.
#[derive(Debug, Clone, Copy)]
pub struct SourceLogger<'a> {
    pipeline: &'a Pipeline,
    source_context: &'a str,
}

impl SourceLogger<'_> {
    pub fn source_context(&self) -> &str {
        self.source_context
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.pipeline.is_enabled(self.source_context, level)
    }

    pub fn write<F>(&self, level: LogLevel, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.pipeline
            .write(level, self.source_context, template, properties);
    }

    pub fn verbose<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Verbose, template, properties);
    }

    pub fn debug<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Debug, template, properties);
    }

    pub fn information<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Information, template, properties);
    }

    pub fn warning<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Warning, template, properties);
    }

    pub fn error<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Error, template, properties);
    }

    pub fn fatal<F>(&self, template: impl Into<MessageTemplate>, properties: F)
    where
        F: FnOnce() -> Properties,
    {
        self.write(LogLevel::Fatal, template, properties);
    }

    /// Error-level event carrying `exception`.
    pub fn exception<F>(
        &self,
        exception: ExceptionInfo,
        template: impl Into<MessageTemplate>,
        properties: F,
    ) where
        F: FnOnce() -> Properties,
    {
        self.pipeline.write_exception(
            LogLevel::Error,
            self.source_context,
            exception,
            template,
            properties,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Sink, SinkError};
    use parking_lot::Mutex;
    use std::sync::{Arc, OnceLock};

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<Arc<LogEvent>>>,
    }

    impl Sink for Collect {
        fn accept(&self, event: &Arc<LogEvent>) -> Result<(), SinkError> {
            self.events.lock().push(Arc::clone(event));
            Ok(())
        }

        fn name(&self) -> &str {
            "collect"
        }
    }

    /// Logs back into the pipeline from inside `accept`.
    struct Reentrant {
        pipeline: OnceLock<Arc<Pipeline>>,
    }

    impl Sink for Reentrant {
        fn accept(&self, _event: &Arc<LogEvent>) -> Result<(), SinkError> {
            if let Some(pipeline) = self.pipeline.get() {
                pipeline.write(LogLevel::Error, "Sink", "inner", Properties::new);
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "reentrant"
        }
    }

    #[test]
    fn test_recursive_emission_is_dropped_and_counted() {
        let collect = Arc::new(Collect::default());
        let reentrant = Arc::new(Reentrant {
            pipeline: OnceLock::new(),
        });
        let pipeline = Arc::new(
            Pipeline::builder()
                .write_to_shared(reentrant.clone())
                .write_to_shared(collect.clone())
                .build(),
        );
        let _ = reentrant.pipeline.set(Arc::clone(&pipeline));

        pipeline.write(LogLevel::Information, "App", "outer", Properties::new);
        pipeline.write(LogLevel::Information, "App", "outer again", Properties::new);

        assert_eq!(collect.events.lock().len(), 2);
        assert_eq!(pipeline.stats().recursive_dropped, 2);
        assert_eq!(pipeline.stats().dispatched, 2);
    }

    #[test]
    fn test_source_logger_uses_its_context() {
        let collect = Arc::new(Collect::default());
        let pipeline = Pipeline::builder().write_to_shared(collect.clone()).build();

        let log = pipeline.for_context("App.Orders");
        log.warning("Order {Id} late", || Properties::new().add("Id", 7));
        log.debug("hidden", Properties::new);

        let events = collect.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_context(), "App.Orders");
        assert_eq!(events[0].render(), "Order 7 late");
    }

    #[tokio::test]
    async fn test_events_after_shutdown_are_counted() {
        let collect = Arc::new(Collect::default());
        let pipeline = Pipeline::builder().write_to_shared(collect.clone()).build();
        pipeline.shutdown(Duration::from_millis(50)).await;

        pipeline.write(LogLevel::Error, "App", "late", Properties::new);
        assert!(collect.events.lock().is_empty());
        assert_eq!(pipeline.stats().dropped_after_shutdown, 1);
    }
}
