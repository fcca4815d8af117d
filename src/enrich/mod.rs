//! Enrichers add or override properties on an event before dispatch.
//!
//! The chain runs synchronously on the emitting thread. Every enricher sees the
//! original event plus the property set built so far, and later enrichers win
//! on key collisions.

pub mod context;
pub mod standard;

pub use context::{ContextGuard, LogContext, LogContextEnricher};
pub use standard::{
    EnvironmentNameEnricher, MachineNameEnricher, ProcessIdEnricher, PropertyEnricher,
    ThreadIdEnricher, ThreadNameEnricher, current_thread_id,
};

use crate::domain::{LogEvent, Properties};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Adds properties to an event.
///
/// Implementations must not block and must not log through the pipeline.
pub trait Enricher: Send + Sync {
    fn enrich(&self, event: &LogEvent, properties: &mut Properties);

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Enricher for F
where
    F: Fn(&LogEvent, &mut Properties) + Send + Sync,
{
    fn enrich(&self, event: &LogEvent, properties: &mut Properties) {
        self(event, properties);
    }
}

/// Ordered list of enrichers, fixed once the pipeline is built.
#[derive(Default)]
pub struct EnricherChain {
    enrichers: Vec<Arc<dyn Enricher>>,
    panics: AtomicU64,
}

impl EnricherChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, enricher: impl Enricher + 'static) {
        self.enrichers.push(Arc::new(enricher));
    }

    pub fn register_shared(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    pub fn len(&self) -> usize {
        self.enrichers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    /// Number of enricher invocations that panicked and were contained.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Run every enricher in registration order and return the enriched copy.
    pub fn apply(&self, event: LogEvent) -> LogEvent {
        if self.enrichers.is_empty() {
            return event;
        }

        let mut properties = event.properties().clone();
        for enricher in &self.enrichers {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                enricher.enrich(&event, &mut properties);
            }));
            if outcome.is_err() {
                self.panics.fetch_add(1, Ordering::Relaxed);
                warn!(enricher = enricher.name(), "Enricher panicked, continuing without it");
            }
        }
        event.with_properties(properties)
    }
}

impl std::fmt::Debug for EnricherChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnricherChain")
            .field(
                "enrichers",
                &self.enrichers.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("panics", &self.panic_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PropertyValue;

    #[test]
    fn test_later_enrichers_win_on_collision() {
        let mut chain = EnricherChain::new();
        chain.register(PropertyEnricher::new("Stage", "first"));
        chain.register(PropertyEnricher::new("Stage", "second"));

        let event = chain.apply(LogEvent::builder().build());
        assert_eq!(event.property("Stage"), Some(&PropertyValue::from("second")));
    }

    #[test]
    fn test_closures_are_enrichers() {
        let mut chain = EnricherChain::new();
        chain.register(|event: &LogEvent, props: &mut Properties| {
            props.insert("Level", event.level().as_str());
        });

        let event = chain.apply(LogEvent::builder().build());
        assert_eq!(event.property("Level"), Some(&PropertyValue::from("Information")));
    }

    struct PanickingEnricher;

    impl Enricher for PanickingEnricher {
        fn enrich(&self, _event: &LogEvent, _properties: &mut Properties) {
            panic!("broken enricher");
        }
    }

    #[test]
    fn test_panicking_enricher_is_contained() {
        let mut chain = EnricherChain::new();
        chain.register(PanickingEnricher);
        chain.register(PropertyEnricher::new("After", true));

        let event = chain.apply(LogEvent::builder().build());
        assert_eq!(event.property("After"), Some(&PropertyValue::Bool(true)));
        assert_eq!(chain.panic_count(), 1);
    }
}
