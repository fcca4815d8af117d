//! Optional process-wide default pipeline.
//!
//! The core works with an explicitly owned [`Pipeline`]; this is only a
//! convenience for code that cannot take one by reference.

use super::Pipeline;
use crate::domain::{LogLevel, MessageTemplate, Properties};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<Pipeline>> = OnceLock::new();

/// Install the default pipeline. Fails, returning it, if one is already set.
pub fn set_global(pipeline: Arc<Pipeline>) -> Result<(), Arc<Pipeline>> {
    GLOBAL.set(pipeline)
}

pub fn global() -> Option<&'static Arc<Pipeline>> {
    GLOBAL.get()
}

/// Write through the default pipeline; a no-op when none is installed.
pub fn write<F>(
    level: LogLevel,
    source_context: &str,
    template: impl Into<MessageTemplate>,
    properties: F,
) where
    F: FnOnce() -> Properties,
{
    if let Some(pipeline) = global() {
        pipeline.write(level, source_context, template, properties);
    }
}
