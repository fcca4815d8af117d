use crate::buffer::Batch;
use crate::domain::{ExceptionInfo, LabelSet, LogEvent, Properties};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error during serialization: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Batch is empty")]
    EmptyBatch,
    #[error("Event timestamp out of range: {0}")]
    TimestampOutOfRange(String),
}

/// How each event becomes a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// Rendered message, with the exception on following lines.
    #[default]
    Text,
    /// One JSON object per line carrying template, level and properties.
    Json,
}

impl FromStr for LineFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LineFormat::Text),
            "json" => Ok(LineFormat::Json),
            other => Err(format!("unknown line format '{other}', expected text or json")),
        }
    }
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFormat::Text => f.write_str("text"),
            LineFormat::Json => f.write_str("json"),
        }
    }
}

/// Encoded request body.
#[derive(Debug, Clone)]
pub struct Payload {
    pub body: Vec<u8>,
    pub compressed: bool,
    pub uncompressed_len: usize,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: [PushStream<'a>; 1],
}

#[derive(Serialize)]
struct PushStream<'a> {
    stream: StreamLabels<'a>,
    values: Vec<[String; 2]>,
}

struct StreamLabels<'a>(&'a LabelSet);

impl Serialize for StreamLabels<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for label in self.0.iter() {
            map.serialize_entry(&label.key, &label.value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonLine<'a> {
    message: String,
    message_template: &'a str,
    level: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    source_context: &'a str,
    #[serde(skip_serializing_if = "Properties::is_empty")]
    properties: &'a Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a ExceptionInfo>,
}

/// Turns a batch into a Loki push request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSerializer {
    line_format: LineFormat,
    compress: bool,
}

impl BatchSerializer {
    pub fn new(line_format: LineFormat, compress: bool) -> Self {
        Self {
            line_format,
            compress,
        }
    }

    pub fn line_format(&self) -> LineFormat {
        self.line_format
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    pub fn format_line(&self, event: &LogEvent) -> Result<String, SerializationError> {
        match self.line_format {
            LineFormat::Text => {
                let mut line = event.render();
                if let Some(exception) = event.exception() {
                    line.push('\n');
                    line.push_str(&exception.to_string());
                }
                Ok(line)
            }
            LineFormat::Json => {
                let line = JsonLine {
                    message: event.render(),
                    message_template: event.template().text(),
                    level: event.level().as_str(),
                    source_context: event.source_context(),
                    properties: event.properties(),
                    exception: event.exception(),
                };
                Ok(serde_json::to_string(&line)?)
            }
        }
    }

    /// Loki push JSON, uncompressed.
    pub fn serialize_json(&self, batch: &Batch) -> Result<Vec<u8>, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let mut values = Vec::with_capacity(batch.size());
        for event in batch.entries() {
            let nanos = event.timestamp().timestamp_nanos_opt().ok_or_else(|| {
                SerializationError::TimestampOutOfRange(event.timestamp().to_rfc3339())
            })?;
            values.push([nanos.to_string(), self.format_line(event)?]);
        }

        let request = PushRequest {
            streams: [PushStream {
                stream: StreamLabels(batch.labels()),
                values,
            }],
        };
        Ok(serde_json::to_vec(&request)?)
    }

    pub fn encode(&self, batch: &Batch) -> Result<Payload, SerializationError> {
        let json = self.serialize_json(batch)?;
        let uncompressed_len = json.len();
        if !self.compress {
            return Ok(Payload {
                body: json,
                compressed: false,
                uncompressed_len,
            });
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(uncompressed_len / 4), Compression::fast());
        encoder.write_all(&json)?;
        Ok(Payload {
            body: encoder.finish()?,
            compressed: true,
            uncompressed_len,
        })
    }
}
