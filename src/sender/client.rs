use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const LOKI_PUSH_PATH: &str = "/loki/api/v1/push";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_idle_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3100".to_string(),
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            max_idle_connections: 8,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("rask-log-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Pooled reqwest client bound to one push URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub client: Client,
    pub config: ClientConfig,
    pub push_url: Url,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let push_url = resolve_push_url(&config.endpoint)?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            config,
            push_url,
        })
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }
}

/// An endpoint without a path gets the Loki push path appended; any explicit
/// path is used as given.
pub fn resolve_push_url(endpoint: &str) -> Result<Url, ClientError> {
    let mut url: Url = endpoint.parse().map_err(|e| {
        ClientError::InvalidConfiguration(format!("Invalid endpoint URL '{endpoint}': {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidConfiguration(format!(
            "Unsupported endpoint scheme '{}'",
            url.scheme()
        )));
    }

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(LOKI_PUSH_PATH);
    }
    Ok(url)
}
