//! Domain layer for rask-log-pipeline.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEvent`: The pipeline's core immutable event
//! - `LogLevel`: Event severity (Verbose/Debug/Information/Warning/Error/Fatal)
//! - `Properties` / `PropertyValue`: Ordered structured properties
//! - `MessageTemplate`: Parsed message template with named placeholders
//! - `LabelSet`: Stream identity for the remote sink
//! - `PipelineError`: Top-level error type

pub mod clock;
pub mod error;
pub mod labels;
pub mod log_event;
pub mod log_level;
pub mod properties;
pub mod template;
pub mod value;

pub use error::PipelineError;
pub use labels::{Label, LabelSet};
pub use log_event::{ExceptionInfo, LogEvent, LogEventBuilder};
pub use log_level::{LogLevel, ParseLevelError};
pub use properties::Properties;
pub use template::{MessageTemplate, TemplateToken};
pub use value::PropertyValue;
