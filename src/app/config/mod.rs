mod cli;
pub mod groups;
pub mod serde_helpers;
mod validation;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

/// Verbosity of the pipeline's own diagnostics on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<DiagnosticsLevel> for tracing::Level {
    fn from(level: DiagnosticsLevel) -> Self {
        match level {
            DiagnosticsLevel::Error => tracing::Level::ERROR,
            DiagnosticsLevel::Warn => tracing::Level::WARN,
            DiagnosticsLevel::Info => tracing::Level::INFO,
            DiagnosticsLevel::Debug => tracing::Level::DEBUG,
            DiagnosticsLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::str::FromStr for DiagnosticsLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

pub use cli::Config;
pub use groups::{ConsoleConfig, ShipperTimings};
