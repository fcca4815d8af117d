use rand::Rng;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("Invalid retry configuration: {0}")]
    InvalidConfig(String),
}

/// Exponential backoff for transient delivery failures.
///
/// `max_retries` counts retries, so a batch is attempted at most
/// `max_retries + 1` times. When `max_retry_window` is set, no retry is
/// scheduled that would start later than the window after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry_window: Option<Duration>,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retry_window: None,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), RetryError> {
        if self.base_delay.is_zero() && self.max_retries > 0 {
            return Err(RetryError::InvalidConfig(
                "base delay must be positive when retries are enabled".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(RetryError::InvalidConfig(format!(
                "max delay {:?} is shorter than base delay {:?}",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry.min(31));
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter {
            apply_jitter(delay).min(self.max_delay)
        } else {
            delay
        }
    }

    /// Whether another attempt may be made after `retries_done` retries,
    /// `elapsed` since the first attempt and a pending `delay`.
    pub fn should_retry(&self, retries_done: u32, elapsed: Duration, delay: Duration) -> bool {
        if retries_done >= self.max_retries {
            return false;
        }
        match self.max_retry_window {
            Some(window) => elapsed.saturating_add(delay) <= window,
            None => true,
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_factor = rng.random_range(0.5..1.5); // ±50% jitter
    Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
}
