use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};

/// Builder for pipeline telemetry sinks.
pub struct PipelineTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sinks: Vec<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PipelineTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sinks: Vec::new(),
            event_publisher: None,
        }
    }

    /// Appends JSON log lines to this file.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Adds an arbitrary log sink (e.g. an in-memory buffer).
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sinks.push(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle. Fails only if the log file cannot be opened.
    pub fn build(self) -> Result<PipelineTelemetry> {
        let mut sinks = self.log_sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        Ok(PipelineTelemetry {
            module: self.module,
            inner: Arc::new(TelemetryInner {
                sinks,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared across pipeline stages.
///
/// Every record is also mirrored to `tracing`, so a subscriber installed by
/// the host application sees the same stream.
#[derive(Clone)]
pub struct PipelineTelemetry {
    module: String,
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PipelineTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTelemetry")
            .field("module", &self.module)
            .field("sinks", &self.inner.sinks.len())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    sinks: Vec<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PipelineTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PipelineTelemetryBuilder {
        PipelineTelemetryBuilder::new(module)
    }

    /// Same sinks, different component label.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Component label stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs structured metadata to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        match level {
            LogLevel::Debug => tracing::debug!(module = %self.module, %metadata, "{message}"),
            LogLevel::Info => tracing::info!(module = %self.module, %metadata, "{message}"),
            LogLevel::Warn => tracing::warn!(module = %self.module, %metadata, "{message}"),
            LogLevel::Error => tracing::error!(module = %self.module, %metadata, "{message}"),
        }
        if self.inner.sinks.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(&self.module, level, message);
        let record = match metadata {
            Value::Null => record,
            Value::Object(_) => record.with_metadata(metadata),
            detail => record.with_field("detail", detail),
        };
        for sink in &self.inner.sinks {
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            publisher.publish(EventRecord::new(&self.module, event_type, payload))?;
        }
        Ok(())
    }
}

/// Fire-and-forget helpers for components holding an optional handle.
pub(crate) trait TelemetryExt {
    fn log_quiet(&self, level: LogLevel, message: &str, metadata: Value);
    fn event_quiet(&self, event_type: &str, payload: Value);
}

impl TelemetryExt for Option<PipelineTelemetry> {
    fn log_quiet(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = self {
            if let Err(err) = tel.log(level, message, metadata) {
                tracing::debug!(error = %err, "telemetry log sink failed");
            }
        }
    }

    fn event_quiet(&self, event_type: &str, payload: Value) {
        if let Some(tel) = self {
            if let Err(err) = tel.event(event_type, payload) {
                tracing::debug!(error = %err, "telemetry event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::MemoryLogSink;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pipeline.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let memory = Arc::new(MemoryLogSink::new(16));
        let telemetry = PipelineTelemetry::builder("pipeline")
            .log_path(&path)
            .log_sink(memory.clone())
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "directive.received", json!({ "chars": 12 }))
            .unwrap();
        telemetry
            .event("directive.completed", json!({ "allowed": false }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("directive.received"));
        assert_eq!(memory.find("directive.received").len(), 1);
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn scalar_metadata_is_kept_as_detail() {
        let memory = Arc::new(MemoryLogSink::new(4));
        let telemetry = PipelineTelemetry::builder("cli")
            .log_sink(memory.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "cli.governance_override", json!("veto disabled"))
            .unwrap();
        telemetry
            .log(LogLevel::Info, "directive.rejected", Value::Null)
            .unwrap();
        let records = memory.snapshot();
        assert_eq!(records[0].metadata["detail"], json!("veto disabled"));
        assert!(records[1].metadata.is_empty());
    }

    #[test]
    fn scoped_handles_share_sinks() {
        let bus = Arc::new(MemoryEventBus::new(8));
        let root = PipelineTelemetry::builder("pipeline")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let gate = root.scoped("governance");
        gate.event("governance.executed", json!({})).unwrap();
        assert_eq!(gate.module(), "governance");
        assert_eq!(bus.snapshot()[0].source, "governance");
    }

    #[test]
    fn absent_handle_is_silent() {
        let telemetry: Option<PipelineTelemetry> = None;
        telemetry.log_quiet(LogLevel::Error, "nothing", json!({}));
        telemetry.event_quiet("nothing", json!({}));
    }
}
