//! Diagnostics for the pipeline itself.
//!
//! Everything the pipeline reports about its own health goes through
//! `tracing` to stderr. It never loops back into the pipeline, so stdout
//! stays reserved for the console sink.

use super::config::DiagnosticsLevel;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingInitError {
    #[error("Invalid filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to set global tracing subscriber: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn level_str(level: DiagnosticsLevel) -> &'static str {
    match level {
        DiagnosticsLevel::Error => "error",
        DiagnosticsLevel::Warn => "warn",
        DiagnosticsLevel::Info => "info",
        DiagnosticsLevel::Debug => "debug",
        DiagnosticsLevel::Trace => "trace",
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSystem {
    directives: Vec<(String, DiagnosticsLevel)>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
        }
    }

    pub fn add_directive(&mut self, target: impl Into<String>, level: DiagnosticsLevel) {
        self.directives.push((target.into(), level));
    }

    /// Quiet the HTTP stack unless asked otherwise.
    pub fn add_default_directives(&mut self) {
        for target in ["hyper", "reqwest", "h2"] {
            self.add_directive(target, DiagnosticsLevel::Warn);
        }
    }

    pub fn directive_count(&self) -> usize {
        self.directives.len()
    }

    pub fn build_filter_string(&self, default_level: DiagnosticsLevel) -> String {
        let mut filter_parts = Vec::with_capacity(self.directives.len() + 1);

        // Default level first
        filter_parts.push(level_str(default_level).to_string());
        for (target, level) in &self.directives {
            filter_parts.push(format!("{target}={}", level_str(*level)));
        }

        filter_parts.join(",")
    }

    /// Install the global subscriber. `RUST_LOG`, when set, replaces the
    /// computed filter.
    pub fn initialize_tracing(&self, default_level: DiagnosticsLevel) -> Result<(), LoggingInitError> {
        let filter_string = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.build_filter_string(default_level));

        let env_filter =
            EnvFilter::try_new(&filter_string).map_err(|source| LoggingInitError::InvalidFilter {
                filter: filter_string.clone(),
                source,
            })?;

        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .compact(),
        );
        tracing::subscriber::set_global_default(subscriber)?;

        Ok(())
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Set up stderr diagnostics, falling back to a plain message if a
/// subscriber is already installed.
pub fn setup_logging_safe(level: DiagnosticsLevel) {
    let mut system = LoggingSystem::new();
    system.add_default_directives();
    if let Err(e) = system.initialize_tracing(level) {
        eprintln!("Warning: diagnostics logging not initialised: {e}");
    }
}
