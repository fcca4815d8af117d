use super::{Config, ConfigError};
use crate::sender::resolve_push_url;

fn is_valid_label_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Endpoint is only used when shipping remotely, but a bad one is
        // still a configuration mistake.
        resolve_push_url(&self.endpoint).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        let labels = self.label_set()?;
        for label in labels.iter() {
            if !is_valid_label_key(&label.key) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Label key '{}' must match [a-zA-Z_][a-zA-Z0-9_]*",
                    label.key
                )));
            }
        }
        for name in &self.label_properties {
            if !is_valid_label_key(name) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Label property '{name}' is not a valid label key"
                )));
            }
        }

        if self.batch_max_events == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch max events must be greater than 0".to_string(),
            ));
        }

        if self.batch_max_age_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch max age must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.max_pending_batches == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max pending batches must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(prefix) = self.overrides.keys().find(|p| p.trim_matches('.').is_empty()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Level override prefix '{prefix}' is empty"
            )));
        }

        self.retry_config()
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        Ok(())
    }
}
