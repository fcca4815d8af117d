pub mod client;
pub mod serialization;
pub mod stats;
pub mod transmission;

pub use client::{ClientConfig, ClientError, HttpClient, resolve_push_url};
pub use serialization::{BatchSerializer, LineFormat, Payload, SerializationError};
pub use stats::{ShipperStats, ShipperStatsSnapshot};
pub use transmission::{
    HttpTransport, TransmissionError, TransmissionResult, Transport, is_transient_status,
};
