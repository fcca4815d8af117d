pub mod config;
pub mod initialization;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, DiagnosticsLevel};
pub use initialization::{InitializationError, Initialized, build_pipeline};
pub use logging_system::{LoggingSystem, setup_logging_safe};

use crate::domain::{LogLevel, MessageTemplate, PipelineError, Properties};
use crate::pipeline::Pipeline;
use crate::shipper::RemoteSink;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "metrics")]
use tracing::debug;
use tracing::{error, info, warn};

/// Reads lines from stdin and writes each one through the pipeline.
pub struct App {
    config: Config,
    pipeline: Pipeline,
    remote: Option<Arc<RemoteSink>>,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args).map_err(|e| PipelineError::Config(e.to_string()))?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        let handle = Handle::try_current().map_err(|e| PipelineError::Runtime(e.to_string()))?;
        let Initialized { pipeline, remote } =
            build_pipeline(&config, &handle).map_err(|e| match e {
                InitializationError::ConfigValidationFailed { reason } => {
                    PipelineError::Config(reason)
                }
                other => PipelineError::Runtime(other.to_string()),
            })?;

        info!("Starting rask-log-pipeline v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "Configuration: minimum_level={}, endpoint={}, remote={}, console={}",
            config.minimum_level, config.endpoint, config.remote, config.console
        );

        Ok(Self {
            config,
            pipeline,
            remote,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Forward stdin until EOF or a shutdown signal, then flush.
    pub async fn run(self) -> Result<(), PipelineError> {
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Like [`App::run`], reading from `reader` instead of stdin.
    pub async fn run_with<R>(self, reader: R) -> Result<(), PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let token = CancellationToken::new();
        let listener = shutdown::spawn_signal_listener(token.clone());

        let result = self.forward_lines(reader, &token).await;

        token.cancel();
        let _ = listener.await;
        self.finish().await;
        result.map(|lines| info!(lines, "Input finished"))
    }

    /// Write every line from `reader` at Information until EOF or `token`
    /// is cancelled. Returns the number of lines read.
    pub async fn forward_lines<R>(
        &self,
        reader: R,
        token: &CancellationToken,
    ) -> Result<u64, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let template = MessageTemplate::from("{Line}");
        let source = self.config.source_context.as_str();
        let mut lines = reader.lines();
        let mut count = 0u64;

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("Shutdown requested, stopping input");
                    break;
                }
                next = lines.next_line() => match next {
                    Ok(Some(line)) => {
                        count += 1;
                        self.pipeline.write(LogLevel::Information, source, template.clone(), || {
                            Properties::new().add("Line", line)
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        return Err(PipelineError::Runtime(e.to_string()));
                    }
                }
            }
        }

        Ok(count)
    }

    /// Flush every sink within the configured grace period and report totals.
    pub async fn finish(&self) {
        self.pipeline
            .shutdown(self.config.timings.shutdown_grace_period)
            .await;

        let stats = self.pipeline.stats();
        info!(
            dispatched = stats.dispatched,
            filtered = stats.filtered,
            recursive_dropped = stats.recursive_dropped,
            enricher_panics = stats.enricher_panics,
            "Pipeline stopped"
        );
        for failure in self.pipeline.sink_failures() {
            if failure.failures > 0 || failure.panics > 0 {
                warn!(
                    sink = %failure.name,
                    failures = failure.failures,
                    panics = failure.panics,
                    "Sink reported failures"
                );
            }
        }
        if let Some(remote) = &self.remote {
            let shipped = remote.stats();
            info!(
                delivered = shipped.events_delivered,
                dropped = shipped.total_dropped(),
                failed = shipped.events_failed,
                retries = shipped.retry_attempts,
                "Remote shipping stopped"
            );
        }

        #[cfg(feature = "metrics")]
        self.log_metrics();
    }

    #[cfg(feature = "metrics")]
    fn log_metrics(&self) {
        match self.metrics_text() {
            Ok(text) => debug!("Final metrics:\n{}", text),
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }

    /// Current counters in the Prometheus text format.
    #[cfg(feature = "metrics")]
    pub fn metrics_text(&self) -> Result<String, crate::metrics::MetricsError> {
        let metrics = crate::metrics::PipelineMetrics::new()?;
        metrics.observe_pipeline(&self.pipeline.stats());
        if let Some(remote) = &self.remote {
            metrics.observe_shipper(&remote.stats());
        }
        metrics.render()
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("rask-log-pipeline {}", get_version());
        return Ok(());
    }

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(2);
        }
    };
    setup_logging_safe(config.diagnostics_level);

    match App::from_config(config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Application error: {}", e);
                process::exit(1);
            }
        }
        Err(e) => {
            error!("Startup error: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> Config {
        let mut config = Config {
            console: false,
            remote: false,
            ..Config::default()
        };
        config.post_process().unwrap();
        config
    }

    #[tokio::test]
    async fn test_forward_lines_counts_every_line() {
        let app = App::from_config(quiet_config()).unwrap();
        let token = CancellationToken::new();

        let input: &[u8] = b"first\nsecond\nthird\n";
        let count = app.forward_lines(input, &token).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(app.pipeline().stats().dispatched, 3);
        app.finish().await;
        assert!(app.pipeline().is_shut_down());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_input() {
        let app = App::from_config(quiet_config()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let (_writer, reader) = tokio::io::duplex(64);
        let count = app
            .forward_lines(BufReader::new(reader), &token)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_run_with_reader_finishes_cleanly() {
        let app = App::from_config(quiet_config()).unwrap();
        let input: &[u8] = b"one\ntwo\n";

        let result = app.run_with(input).await;
        assert!(result.is_ok());
    }
}
