use super::Pipeline;
use crate::domain::LogLevel;
use crate::enrich::{Enricher, EnricherChain};
use crate::filter::{LevelFilter, LevelOverrideTable};
use crate::sink::{Dispatcher, Sink};
use std::sync::Arc;

/// Ordered registration of filter rules, enrichers and sinks.
///
/// Everything is fixed once [`PipelineBuilder::build`] returns.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    minimum_level: LogLevel,
    overrides: Vec<(String, LogLevel)>,
    enrichers: EnricherChain,
    dispatcher: Dispatcher,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minimum_level(mut self, level: LogLevel) -> Self {
        self.minimum_level = level;
        self
    }

    /// Minimum level for `prefix` and every dotted namespace below it.
    pub fn override_level(mut self, prefix: impl Into<String>, level: LogLevel) -> Self {
        self.overrides.push((prefix.into(), level));
        self
    }

    pub fn enrich(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enrichers.register(enricher);
        self
    }

    pub fn enrich_shared(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.register_shared(enricher);
        self
    }

    pub fn write_to(self, sink: impl Sink + 'static) -> Self {
        self.write_to_shared(Arc::new(sink))
    }

    /// Register a sink the caller keeps a handle to.
    pub fn write_to_shared(mut self, sink: Arc<dyn Sink>) -> Self {
        self.dispatcher.register(sink);
        self
    }

    pub fn build(self) -> Pipeline {
        let table = LevelOverrideTable::new(self.minimum_level, self.overrides);
        Pipeline::from_parts(LevelFilter::new(table), self.enrichers, self.dispatcher)
    }
}
