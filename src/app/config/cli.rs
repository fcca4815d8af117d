use super::groups::{ConsoleConfig, ShipperTimings};
use super::serde_helpers::{
    load_env_list, load_env_path_opt, load_env_string, load_env_string_opt, load_env_var,
    load_env_var_opt,
};
use super::{ConfigError, DiagnosticsLevel};
use crate::buffer::{BatchConfig, OverflowPolicy, OverflowPolicyKind};
use crate::domain::{LabelSet, LogLevel};
use crate::reliability::RetryConfig;
use crate::sender::{ClientConfig, LineFormat};
use crate::shipper::RemoteSinkConfig;
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_overrides() -> BTreeMap<String, LogLevel> {
    ["hyper", "reqwest", "h2"]
        .into_iter()
        .map(|prefix| (prefix.to_string(), LogLevel::Warning))
        .collect()
}

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(author, version, about = "Forward stdin lines through a structured log pipeline", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Global minimum level
    #[arg(long, env = "RASK_MINIMUM_LEVEL", default_value = "Information")]
    pub minimum_level: LogLevel,

    /// Per-namespace minimum level as PREFIX=LEVEL (repeatable)
    #[arg(long = "override", env = "RASK_LEVEL_OVERRIDES", value_delimiter = ',')]
    #[serde(skip)]
    pub level_overrides: Vec<String>,

    /// Namespace prefix to minimum level, from the config file
    #[arg(skip = default_overrides())]
    pub overrides: BTreeMap<String, LogLevel>,

    /// Remote push endpoint. A bare host gets /loki/api/v1/push appended
    #[arg(long, env = "RASK_LOKI_ENDPOINT", default_value = "http://localhost:3100")]
    pub endpoint: String,

    /// Static stream labels as KEY=VALUE, in order
    #[arg(
        long = "label",
        env = "RASK_LABELS",
        value_delimiter = ',',
        default_values_t = ["app=rask-log-pipeline".to_string(), "environment=local".to_string()]
    )]
    pub labels: Vec<String>,

    /// Event properties promoted to stream labels (`level` for the event level)
    #[arg(long = "label-property", env = "RASK_LABEL_PROPERTIES", value_delimiter = ',')]
    pub label_properties: Vec<String>,

    /// Maximum events per batch
    #[arg(long, env = "RASK_BATCH_MAX_EVENTS", default_value = "1000")]
    pub batch_max_events: usize,

    /// Maximum batch age in milliseconds, measured from its first event
    #[arg(long, env = "RASK_BATCH_MAX_AGE_MS", default_value = "2000")]
    pub batch_max_age_ms: u64,

    /// Ingress queue capacity in events
    #[arg(long, env = "RASK_QUEUE_CAPACITY", default_value = "10000")]
    pub queue_capacity: usize,

    /// What to do when the ingress queue is full (drop-newest, block-with-timeout)
    #[arg(long, env = "RASK_OVERFLOW_POLICY", default_value = "drop-newest")]
    pub overflow_policy: OverflowPolicyKind,

    /// How long block-with-timeout waits for space, in milliseconds
    #[arg(long, env = "RASK_BLOCK_TIMEOUT_MS", default_value = "50")]
    pub block_timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[arg(long, env = "RASK_MAX_RETRIES", default_value = "5")]
    pub max_retries: u32,

    /// First retry delay in milliseconds, doubled on every retry
    #[arg(long, env = "RASK_RETRY_BACKOFF_BASE_MS", default_value = "500")]
    pub retry_backoff_base_ms: u64,

    /// Upper bound on a single retry delay in milliseconds
    #[arg(long, env = "RASK_RETRY_BACKOFF_MAX_MS", default_value = "30000")]
    pub retry_backoff_max_ms: u64,

    /// Give up retrying once this many milliseconds have passed since the first attempt
    #[arg(long, env = "RASK_MAX_RETRY_WINDOW_MS")]
    pub max_retry_window_ms: Option<u64>,

    /// Randomize retry delays by ±50%
    #[arg(long, env = "RASK_RETRY_JITTER", default_value_t = true, action = ArgAction::Set)]
    pub retry_jitter: bool,

    /// Closed batches allowed to wait behind an in-flight batch, per label set
    #[arg(long, env = "RASK_MAX_PENDING_BATCHES", default_value = "16")]
    pub max_pending_batches: usize,

    /// HTTP request timeout in milliseconds
    #[arg(long, env = "RASK_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Gzip request bodies
    #[arg(long, env = "RASK_COMPRESSION")]
    pub compression: bool,

    /// Remote line format (text, json)
    #[arg(long, env = "RASK_LINE_FORMAT", default_value = "text")]
    pub line_format: LineFormat,

    /// Time allowed for flushing at shutdown, in milliseconds
    #[arg(long, env = "RASK_SHUTDOWN_GRACE_MS", default_value = "5000")]
    pub shutdown_grace_ms: u64,

    /// Write events to stdout
    #[arg(long, env = "RASK_CONSOLE", default_value_t = true, action = ArgAction::Set)]
    pub console: bool,

    /// Properties shown after the console message
    #[arg(long = "console-property", env = "RASK_CONSOLE_PROPERTIES", value_delimiter = ',')]
    pub console_properties: Vec<String>,

    /// Ship events to the remote endpoint
    #[arg(long, env = "RASK_REMOTE", default_value_t = true, action = ArgAction::Set)]
    pub remote: bool,

    /// Environment name attached to every event (defaults to RASK_ENVIRONMENT/ENVIRONMENT, then Production)
    #[arg(long, env = "RASK_ENVIRONMENT")]
    pub environment_name: Option<String>,

    /// Attach the machine name to every event
    #[arg(long, env = "RASK_ENRICH_MACHINE_NAME")]
    pub enrich_machine_name: bool,

    /// Source context for lines read from stdin
    #[arg(long, env = "RASK_SOURCE_CONTEXT", default_value = "Stdin")]
    pub source_context: String,

    /// Verbosity of the pipeline's own diagnostics on stderr
    #[arg(long, env = "RASK_DIAGNOSTICS_LEVEL", default_value = "warn")]
    pub diagnostics_level: DiagnosticsLevel,

    /// Configuration file path (optional)
    #[arg(long, env = "RASK_PIPELINE_CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub timings: ShipperTimings,

    #[serde(skip)]
    #[arg(skip)]
    pub console_config: ConsoleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            minimum_level: LogLevel::Information,
            level_overrides: Vec::new(),
            overrides: default_overrides(),
            endpoint: "http://localhost:3100".to_string(),
            labels: vec![
                "app=rask-log-pipeline".to_string(),
                "environment=local".to_string(),
            ],
            label_properties: Vec::new(),
            batch_max_events: 1000,
            batch_max_age_ms: 2000,
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicyKind::DropNewest,
            block_timeout_ms: 50,
            max_retries: 5,
            retry_backoff_base_ms: 500,
            retry_backoff_max_ms: 30_000,
            max_retry_window_ms: None,
            retry_jitter: true,
            max_pending_batches: 16,
            request_timeout_ms: 10_000,
            compression: false,
            line_format: LineFormat::Text,
            shutdown_grace_ms: 5000,
            console: true,
            console_properties: Vec::new(),
            remote: true,
            environment_name: None,
            enrich_machine_name: false,
            source_context: "Stdin".to_string(),
            diagnostics_level: DiagnosticsLevel::Warn,
            config_file: None,
            timings: ShipperTimings::default(),
            console_config: ConsoleConfig::default(),
        }
    }
}

/// Copy every listed field from `cli` into `config` when `cli` changed it
/// from the default.
macro_rules! merge_explicit {
    ($config:expr, $cli:expr, $defaults:expr, [$($field:ident),* $(,)?]) => {
        $(
            if $cli.$field != $defaults.$field {
                $config.$field = $cli.$field.clone();
            }
        )*
    };
}

impl Config {
    /// Parse CLI arguments (clap also reads the `RASK_*` variables). When a
    /// config file is named, it provides the base and explicit flags win.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Config::parse_from(args);

        let mut config = match &cli.config_file {
            Some(path) => Self::read_file(path)?,
            None => cli.clone(),
        };
        if cli.config_file.is_some() {
            config.merge_cli(&cli);
            config.config_file = cli.config_file.clone();
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from defaults, an optional config file, then variables read
    /// through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut file = None;
        load_env_path_opt(&lookup, "RASK_PIPELINE_CONFIG_FILE", &mut file);
        let mut config = match &file {
            Some(path) => Self::read_file(path)?,
            None => Config::default(),
        };
        config.config_file = file;

        load_env_var(&lookup, "RASK_MINIMUM_LEVEL", &mut config.minimum_level)?;
        load_env_list(&lookup, "RASK_LEVEL_OVERRIDES", &mut config.level_overrides);
        load_env_string(&lookup, "RASK_LOKI_ENDPOINT", &mut config.endpoint);
        load_env_list(&lookup, "RASK_LABELS", &mut config.labels);
        load_env_list(&lookup, "RASK_LABEL_PROPERTIES", &mut config.label_properties);
        load_env_var(&lookup, "RASK_BATCH_MAX_EVENTS", &mut config.batch_max_events)?;
        load_env_var(&lookup, "RASK_BATCH_MAX_AGE_MS", &mut config.batch_max_age_ms)?;
        load_env_var(&lookup, "RASK_QUEUE_CAPACITY", &mut config.queue_capacity)?;
        load_env_var(&lookup, "RASK_OVERFLOW_POLICY", &mut config.overflow_policy)?;
        load_env_var(&lookup, "RASK_BLOCK_TIMEOUT_MS", &mut config.block_timeout_ms)?;
        load_env_var(&lookup, "RASK_MAX_RETRIES", &mut config.max_retries)?;
        load_env_var(&lookup, "RASK_RETRY_BACKOFF_BASE_MS", &mut config.retry_backoff_base_ms)?;
        load_env_var(&lookup, "RASK_RETRY_BACKOFF_MAX_MS", &mut config.retry_backoff_max_ms)?;
        load_env_var_opt(&lookup, "RASK_MAX_RETRY_WINDOW_MS", &mut config.max_retry_window_ms)?;
        load_env_var(&lookup, "RASK_RETRY_JITTER", &mut config.retry_jitter)?;
        load_env_var(&lookup, "RASK_MAX_PENDING_BATCHES", &mut config.max_pending_batches)?;
        load_env_var(&lookup, "RASK_REQUEST_TIMEOUT_MS", &mut config.request_timeout_ms)?;
        load_env_var(&lookup, "RASK_COMPRESSION", &mut config.compression)?;
        load_env_var(&lookup, "RASK_LINE_FORMAT", &mut config.line_format)?;
        load_env_var(&lookup, "RASK_SHUTDOWN_GRACE_MS", &mut config.shutdown_grace_ms)?;
        load_env_var(&lookup, "RASK_CONSOLE", &mut config.console)?;
        load_env_list(&lookup, "RASK_CONSOLE_PROPERTIES", &mut config.console_properties);
        load_env_var(&lookup, "RASK_REMOTE", &mut config.remote)?;
        load_env_string_opt(&lookup, "RASK_ENVIRONMENT", &mut config.environment_name);
        load_env_var(&lookup, "RASK_ENRICH_MACHINE_NAME", &mut config.enrich_machine_name)?;
        load_env_string(&lookup, "RASK_SOURCE_CONTEXT", &mut config.source_context);
        load_env_var(&lookup, "RASK_DIAGNOSTICS_LEVEL", &mut config.diagnostics_level)?;

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path.as_ref())?;
        config.config_file = Some(path.as_ref().to_path_buf());
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn merge_cli(&mut self, cli: &Config) {
        let defaults = Config::default();
        merge_explicit!(self, cli, defaults, [
            minimum_level,
            level_overrides,
            endpoint,
            labels,
            label_properties,
            batch_max_events,
            batch_max_age_ms,
            queue_capacity,
            overflow_policy,
            block_timeout_ms,
            max_retries,
            retry_backoff_base_ms,
            retry_backoff_max_ms,
            max_retry_window_ms,
            retry_jitter,
            max_pending_batches,
            request_timeout_ms,
            compression,
            line_format,
            shutdown_grace_ms,
            console,
            console_properties,
            remote,
            environment_name,
            enrich_machine_name,
            source_context,
            diagnostics_level,
        ]);
    }

    /// Fold `PREFIX=LEVEL` overrides into the table and derive durations.
    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        for raw in std::mem::take(&mut self.level_overrides) {
            let (prefix, level) = raw.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConfig(format!("Level override '{raw}' is not PREFIX=LEVEL"))
            })?;
            let level: LogLevel = level.trim().parse().map_err(|e| {
                ConfigError::InvalidConfig(format!("Level override '{raw}': {e}"))
            })?;
            self.overrides.insert(prefix.trim().to_string(), level);
        }

        self.timings = ShipperTimings {
            batch_max_age: Duration::from_millis(self.batch_max_age_ms),
            block_timeout: Duration::from_millis(self.block_timeout_ms),
            retry_backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            retry_backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
            max_retry_window: self.max_retry_window_ms.map(Duration::from_millis),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            shutdown_grace_period: Duration::from_millis(self.shutdown_grace_ms),
        };

        self.console_config = ConsoleConfig {
            enabled: self.console,
            properties: self.console_properties.clone(),
        };

        Ok(())
    }

    /// Static labels in configured order.
    pub fn label_set(&self) -> Result<LabelSet, ConfigError> {
        let mut labels = LabelSet::default();
        for raw in &self.labels {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConfig(format!("Label '{raw}' is not KEY=VALUE"))
            })?;
            labels.push(key.trim(), value.trim());
        }
        Ok(labels)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: self.timings.retry_backoff_base,
            max_delay: self.timings.retry_backoff_max,
            max_retry_window: self.timings.max_retry_window,
            jitter: self.retry_jitter,
        }
    }

    pub fn remote_sink_config(&self) -> Result<RemoteSinkConfig, ConfigError> {
        Ok(RemoteSinkConfig {
            labels: self.label_set()?,
            label_properties: self.label_properties.clone(),
            batch: BatchConfig {
                max_events: self.batch_max_events,
                max_age: self.timings.batch_max_age,
            },
            queue_capacity: self.queue_capacity,
            overflow_policy: OverflowPolicy::from_kind(
                self.overflow_policy,
                self.timings.block_timeout,
            ),
            retry: self.retry_config(),
            max_pending_batches: self.max_pending_batches,
            shutdown_grace_period: self.timings.shutdown_grace_period,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: self.timings.request_timeout,
            ..ClientConfig::default()
        }
    }
}
