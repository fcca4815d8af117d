use super::HttpClient;
use super::serialization::{BatchSerializer, SerializationError};
use crate::buffer::Batch;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum TransmissionError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] SerializationError),
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transmission timeout")]
    Timeout,
}

impl TransmissionError {
    /// Transient failures are worth retrying; permanent ones never succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransmissionError::SerializationFailed(_) => false,
            TransmissionError::RequestError(e) => !(e.is_builder() || e.is_redirect()),
            TransmissionError::Status { status, .. } => is_transient_status(*status),
            TransmissionError::Timeout => true,
        }
    }
}

/// 408, 429 and 5xx are retried. Everything else outside 2xx is permanent.
pub fn is_transient_status(status: u16) -> bool {
    status == StatusCode::REQUEST_TIMEOUT.as_u16()
        || status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || (500..600).contains(&status)
}

#[derive(Debug, Clone)]
pub struct TransmissionResult {
    pub status_code: u16,
    pub latency: Duration,
    pub bytes_sent: usize,
    pub compressed: bool,
}

/// Delivers one batch, once. Retrying is the caller's business.
pub trait Transport: Send + Sync + 'static {
    fn push(
        &self,
        batch: &Batch,
    ) -> impl Future<Output = Result<TransmissionResult, TransmissionError>> + Send;
}

/// Loki push over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    serializer: BatchSerializer,
}

impl HttpTransport {
    pub fn new(client: HttpClient, serializer: BatchSerializer) -> Self {
        Self { client, serializer }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    fn build_headers(compressed: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if compressed {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        headers
    }
}

impl Transport for HttpTransport {
    async fn push(&self, batch: &Batch) -> Result<TransmissionResult, TransmissionError> {
        let start = Instant::now();
        let payload = self.serializer.encode(batch)?;
        let bytes_sent = payload.body.len();

        let response = self
            .client
            .client
            .post(self.client.push_url.clone())
            .headers(Self::build_headers(payload.compressed))
            .body(payload.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransmissionError::Timeout
                } else {
                    TransmissionError::RequestError(e)
                }
            })?;

        let status = response.status();
        let latency = start.elapsed();
        if status.is_success() {
            debug!(
                batch_id = %batch.id(),
                entries = batch.size(),
                bytes_sent,
                ?latency,
                "Pushed batch"
            );
            return Ok(TransmissionResult {
                status_code: status.as_u16(),
                latency,
                bytes_sent,
                compressed: payload.compressed,
            });
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(TransmissionError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
