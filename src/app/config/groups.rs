use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durations derived from the `*_ms` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipperTimings {
    #[serde(with = "super::serde_helpers")]
    pub batch_max_age: Duration,
    #[serde(with = "super::serde_helpers")]
    pub block_timeout: Duration,
    #[serde(with = "super::serde_helpers")]
    pub retry_backoff_base: Duration,
    #[serde(with = "super::serde_helpers")]
    pub retry_backoff_max: Duration,
    #[serde(with = "super::serde_helpers::option")]
    pub max_retry_window: Option<Duration>,
    #[serde(with = "super::serde_helpers")]
    pub request_timeout: Duration,
    #[serde(with = "super::serde_helpers")]
    pub shutdown_grace_period: Duration,
}

impl Default for ShipperTimings {
    fn default() -> Self {
        Self {
            batch_max_age: Duration::from_secs(2),
            block_timeout: Duration::from_millis(50),
            retry_backoff_base: Duration::from_millis(500),
            retry_backoff_max: Duration::from_secs(30),
            max_retry_window: None,
            request_timeout: Duration::from_secs(10),
            shutdown_grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Properties printed after the message.
    pub properties: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            properties: Vec::new(),
        }
    }
}
