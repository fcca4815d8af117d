use super::clock;
use super::log_level::LogLevel;
use super::properties::Properties;
use super::template::MessageTemplate;
use super::value::PropertyValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Structured error payload attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Capture any `std::error::Error`, folding its source chain into the message.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let kind = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_string();
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(" ---> ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(kind, message)
    }
}

impl std::fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(stack) = &self.stack_trace {
            write!(f, "\n{stack}")?;
        }
        Ok(())
    }
}

/// One log occurrence.
///
/// Events are immutable once built. Enrichment produces a new event through
/// [`LogEvent::with_properties`], so sinks holding an `Arc<LogEvent>` never
/// observe a change.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    source_context: Arc<str>,
    template: MessageTemplate,
    properties: Arc<Properties>,
    exception: Option<Arc<ExceptionInfo>>,
}

impl LogEvent {
    pub fn builder() -> LogEventBuilder {
        LogEventBuilder::default()
    }

    pub fn new(
        level: LogLevel,
        source_context: &str,
        template: impl Into<MessageTemplate>,
        properties: Properties,
    ) -> Self {
        LogEvent::builder()
            .level(level)
            .source_context(source_context)
            .template(template)
            .properties(properties)
            .build()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn source_context(&self) -> &str {
        &self.source_context
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_deref()
    }

    pub fn render(&self) -> String {
        self.template.render(&self.properties)
    }

    /// Copy of this event carrying a different property set.
    pub fn with_properties(&self, properties: Properties) -> LogEvent {
        LogEvent {
            timestamp: self.timestamp,
            level: self.level,
            source_context: Arc::clone(&self.source_context),
            template: self.template.clone(),
            properties: Arc::new(properties),
            exception: self.exception.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LogEventBuilder {
    timestamp: Option<DateTime<Utc>>,
    level: LogLevel,
    source_context: Option<Arc<str>>,
    template: Option<MessageTemplate>,
    properties: Properties,
    exception: Option<ExceptionInfo>,
}

impl LogEventBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn source_context(mut self, source_context: &str) -> Self {
        self.source_context = Some(Arc::from(source_context));
        self
    }

    pub fn template(mut self, template: impl Into<MessageTemplate>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name, value);
        self
    }

    pub fn exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn build(self) -> LogEvent {
        LogEvent {
            timestamp: self.timestamp.unwrap_or_else(clock::now),
            level: self.level,
            source_context: self.source_context.unwrap_or_else(|| Arc::from("")),
            template: self.template.unwrap_or_default(),
            properties: Arc::new(self.properties),
            exception: self.exception.map(Arc::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let event = LogEvent::builder().build();
        assert_eq!(event.level(), LogLevel::Information);
        assert_eq!(event.source_context(), "");
        assert_eq!(event.render(), "");
        assert!(event.properties().is_empty());
        assert!(event.exception().is_none());
    }

    #[test]
    fn test_with_properties_leaves_original_untouched() {
        let original = LogEvent::builder()
            .template("Hello {Name}")
            .property("Name", "world")
            .build();

        let enriched = original.with_properties(
            original.properties().clone().add("ThreadId", 7_u64),
        );

        assert_eq!(original.properties().len(), 1);
        assert_eq!(enriched.properties().len(), 2);
        assert_eq!(enriched.render(), "Hello world");
        assert_eq!(enriched.timestamp(), original.timestamp());
    }

    #[test]
    fn test_exception_from_error_keeps_source_chain() {
        let io = std::io::Error::other("disk unplugged");
        let info = ExceptionInfo::from_error(&io);
        assert_eq!(info.kind, "Error");
        assert!(info.message.contains("disk unplugged"));
    }
}
