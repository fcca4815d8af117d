//! Ambient, thread-scoped properties.
//!
//! Pushing a property returns a guard; the property is attached to every event
//! emitted on the same thread until the guard drops. Scopes nest, and an inner
//! push of the same name shadows the outer one.

use super::Enricher;
use crate::domain::{LogEvent, Properties, PropertyValue};
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CONTEXT: RefCell<Vec<(String, PropertyValue)>> = const { RefCell::new(Vec::new()) };
}

pub struct LogContext;

impl LogContext {
    /// Push a property for the current thread. Dropping the guard pops it
    /// along with anything pushed after it.
    pub fn push_property(
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> ContextGuard {
        let depth = CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let depth = ctx.len();
            ctx.push((name.into(), value.into()));
            depth
        });
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with the property pushed, popping it afterwards.
    pub fn scope<R>(
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
        f: impl FnOnce() -> R,
    ) -> R {
        let _guard = Self::push_property(name, value);
        f()
    }

    /// Current properties in push order.
    pub fn snapshot() -> Vec<(String, PropertyValue)> {
        CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn depth() -> usize {
        CONTEXT.with(|ctx| ctx.borrow().len())
    }
}

/// Pops its context entry on drop. Bound to the thread that created it.
#[must_use = "the property is removed as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        // try_with: the thread-local may already be gone during thread teardown.
        let _ = CONTEXT.try_with(|ctx| {
            if let Ok(mut ctx) = ctx.try_borrow_mut() {
                ctx.truncate(self.depth);
            }
        });
    }
}

/// Copies the current thread's [`LogContext`] onto each event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContextEnricher;

impl Enricher for LogContextEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        CONTEXT.with(|ctx| {
            for (name, value) in ctx.borrow().iter() {
                properties.insert(name.clone(), value.clone());
            }
        });
    }

    fn name(&self) -> &str {
        "LogContext"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enriched() -> Properties {
        let event = LogEvent::builder().build();
        let mut properties = Properties::new();
        LogContextEnricher.enrich(&event, &mut properties);
        properties
    }

    #[test]
    fn test_guard_scopes_property() {
        {
            let _guard = LogContext::push_property("RequestId", "abc");
            assert_eq!(enriched().get("RequestId"), Some(&PropertyValue::from("abc")));
        }
        assert!(enriched().get("RequestId").is_none());
        assert_eq!(LogContext::depth(), 0);
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let _outer = LogContext::push_property("User", "outer");
        LogContext::scope("User", "inner", || {
            assert_eq!(enriched().get("User"), Some(&PropertyValue::from("inner")));
        });
        assert_eq!(enriched().get("User"), Some(&PropertyValue::from("outer")));
    }

    #[test]
    fn test_context_does_not_cross_threads() {
        let _guard = LogContext::push_property("Tenant", "t1");
        let other = std::thread::spawn(enriched).join().unwrap();
        assert!(other.is_empty());
    }
}
