#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for rates and display
    clippy::cast_sign_loss,           // Safe where values are known non-negative
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. SinkError in sink module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod domain;
pub mod enrich;
pub mod filter;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pipeline;
pub mod reliability;
pub mod sender;
pub mod shipper;
pub mod sink;

// Re-export main types for easy access
pub use app::{App, Config};
pub use domain::{LabelSet, LogEvent, LogLevel, MessageTemplate, Properties, PropertyValue};
pub use enrich::{Enricher, LogContext};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use shipper::{RemoteSink, RemoteSinkConfig};
pub use sink::{ConsoleSink, Sink};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
