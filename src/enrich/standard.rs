use super::Enricher;
use crate::domain::{LogEvent, Properties, PropertyValue};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small, stable, process-unique id for the calling thread.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Adds `EnvironmentName`.
#[derive(Debug, Clone)]
pub struct EnvironmentNameEnricher {
    environment: String,
}

impl EnvironmentNameEnricher {
    pub const PROPERTY: &'static str = "EnvironmentName";

    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Reads `RASK_ENVIRONMENT`, then `ENVIRONMENT`, falling back to `Production`.
    pub fn from_env() -> Self {
        let environment = std::env::var("RASK_ENVIRONMENT")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "Production".to_string());
        Self::new(environment)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

impl Enricher for EnvironmentNameEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        properties.insert(Self::PROPERTY, self.environment.as_str());
    }

    fn name(&self) -> &str {
        "EnvironmentName"
    }
}

/// Adds `ProcessId`.
#[derive(Debug, Clone)]
pub struct ProcessIdEnricher {
    pid: u32,
}

impl ProcessIdEnricher {
    pub const PROPERTY: &'static str = "ProcessId";

    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
        }
    }
}

impl Default for ProcessIdEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for ProcessIdEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        properties.insert(Self::PROPERTY, self.pid);
    }

    fn name(&self) -> &str {
        "ProcessId"
    }
}

/// Adds `ThreadId` for the thread that emitted the event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadIdEnricher;

impl ThreadIdEnricher {
    pub const PROPERTY: &'static str = "ThreadId";
}

impl Enricher for ThreadIdEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        properties.insert(Self::PROPERTY, current_thread_id());
    }

    fn name(&self) -> &str {
        "ThreadId"
    }
}

/// Adds `ThreadName` when the emitting thread has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadNameEnricher;

impl ThreadNameEnricher {
    pub const PROPERTY: &'static str = "ThreadName";
}

impl Enricher for ThreadNameEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        if let Some(name) = std::thread::current().name() {
            properties.insert(Self::PROPERTY, name);
        }
    }

    fn name(&self) -> &str {
        "ThreadName"
    }
}

/// Adds `MachineName`, resolved once at construction.
#[derive(Debug, Clone)]
pub struct MachineNameEnricher {
    machine_name: String,
}

impl MachineNameEnricher {
    pub const PROPERTY: &'static str = "MachineName";

    pub fn new() -> Self {
        let machine_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self { machine_name }
    }

    pub fn with_name(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
        }
    }
}

impl Default for MachineNameEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for MachineNameEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        properties.insert(Self::PROPERTY, self.machine_name.as_str());
    }

    fn name(&self) -> &str {
        "MachineName"
    }
}

/// Adds one fixed property to every event.
#[derive(Debug, Clone)]
pub struct PropertyEnricher {
    property: String,
    value: PropertyValue,
}

impl PropertyEnricher {
    pub fn new(property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

impl Enricher for PropertyEnricher {
    fn enrich(&self, _event: &LogEvent, properties: &mut Properties) {
        properties.insert(self.property.clone(), self.value.clone());
    }

    fn name(&self) -> &str {
        &self.property
    }
}
