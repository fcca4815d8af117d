//! Wiring a [`Pipeline`] from a validated [`Config`].

use super::config::Config;
use crate::enrich::{
    EnvironmentNameEnricher, LogContextEnricher, MachineNameEnricher, ProcessIdEnricher,
    ThreadIdEnricher,
};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::sender::{BatchSerializer, HttpClient, HttpTransport};
use crate::shipper::RemoteSink;
use crate::sink::ConsoleSink;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Configuration validation failed: {reason}")]
    ConfigValidationFailed { reason: String },

    #[error("Resource initialization failed: {resource}")]
    ResourceInitFailed {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Remote shipping needs a running tokio runtime")]
    NoRuntime,
}

impl InitializationError {
    fn resource(
        resource: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        InitializationError::ResourceInitFailed {
            resource: resource.to_string(),
            source: Box::new(source),
        }
    }
}

/// A built pipeline plus a handle on its remote sink, when one is configured.
pub struct Initialized {
    pub pipeline: Pipeline,
    pub remote: Option<Arc<RemoteSink>>,
}

/// Filter from the minimum level and overrides, then the standard enrichers,
/// then the console sink and the remote shipper.
pub fn build_pipeline(config: &Config, handle: &Handle) -> Result<Initialized, InitializationError> {
    let mut builder = PipelineBuilder::new().minimum_level(config.minimum_level);
    for (prefix, level) in &config.overrides {
        builder = builder.override_level(prefix.clone(), *level);
    }

    let environment = match &config.environment_name {
        Some(name) => EnvironmentNameEnricher::new(name.clone()),
        None => EnvironmentNameEnricher::from_env(),
    };
    builder = builder
        .enrich(LogContextEnricher)
        .enrich(environment)
        .enrich(ProcessIdEnricher::new())
        .enrich(ThreadIdEnricher);
    if config.enrich_machine_name {
        builder = builder.enrich(MachineNameEnricher::new());
    }

    if config.console_config.enabled {
        builder = builder.write_to(
            ConsoleSink::stdout().with_properties(config.console_config.properties.iter().cloned()),
        );
    }

    let remote = if config.remote {
        let remote_config = config
            .remote_sink_config()
            .map_err(|e| InitializationError::ConfigValidationFailed {
                reason: e.to_string(),
            })?;
        let client = HttpClient::new(config.client_config())
            .map_err(|e| InitializationError::resource("http client", e))?;
        info!("Shipping to {}", client.push_url());
        let transport =
            HttpTransport::new(client, BatchSerializer::new(config.line_format, config.compression));
        let sink = RemoteSink::spawn(&remote_config, transport, handle)
            .map_err(|e| InitializationError::resource("remote sink", e))?;
        let sink = Arc::new(sink);
        builder = builder.write_to_shared(Arc::clone(&sink) as Arc<dyn crate::sink::Sink>);
        Some(sink)
    } else {
        None
    };

    Ok(Initialized {
        pipeline: builder.build(),
        remote,
    })
}

impl Pipeline {
    /// Build from `config` on the current tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self, InitializationError> {
        let handle = Handle::try_current().map_err(|_| InitializationError::NoRuntime)?;
        Ok(build_pipeline(config, &handle)?.pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_only() -> Config {
        let mut config = Config {
            console: false,
            remote: false,
            environment_name: Some("Test".to_string()),
            ..Config::default()
        };
        config.post_process().unwrap();
        config
    }

    #[test]
    fn test_from_config_outside_runtime_fails() {
        let result = Pipeline::from_config(&console_only());
        assert!(matches!(result, Err(InitializationError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_overrides_are_applied() {
        let mut config = console_only();
        config.overrides.insert("App.Db".to_string(), crate::domain::LogLevel::Debug);

        let initialized = build_pipeline(&config, &Handle::current()).unwrap();
        assert!(initialized.remote.is_none());
        assert!(initialized.pipeline.is_enabled("App.Db", crate::domain::LogLevel::Debug));
        assert!(!initialized.pipeline.is_enabled("App.Web", crate::domain::LogLevel::Debug));
        assert!(!initialized.pipeline.is_enabled("hyper::proto", crate::domain::LogLevel::Information));
    }

    #[tokio::test]
    async fn test_remote_sink_is_registered() {
        let mut config = console_only();
        config.remote = true;

        let initialized = build_pipeline(&config, &Handle::current()).unwrap();
        let remote = initialized.remote.expect("remote sink");
        assert_eq!(initialized.pipeline.sink_failures().len(), 1);
        initialized.pipeline.shutdown(std::time::Duration::from_millis(100)).await;
        assert_eq!(remote.stats().enqueued, 0);
    }
}
