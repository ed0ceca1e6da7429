//! [`EventSink`] implementations.

use chrono::{DateTime, Utc};
use enrich_core::{EventSink, LogLevel};
use parking_lot::Mutex;
use serde::Serialize;

/// Forwards events to `tracing` under the `enrichment` target.
///
/// Field names are only known at runtime, so they are rendered into a single
/// `fields` value as `key=value` pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, String)]) {
        let rendered = render_fields(fields);
        match level {
            LogLevel::Trace => {
                tracing::trace!(target: "enrichment", fields = %rendered, "{message}")
            }
            LogLevel::Debug => {
                tracing::debug!(target: "enrichment", fields = %rendered, "{message}")
            }
            LogLevel::Info => tracing::info!(target: "enrichment", fields = %rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "enrichment", fields = %rendered, "{message}"),
            LogLevel::Error => {
                tracing::error!(target: "enrichment", fields = %rendered, "{message}")
            }
        }
    }
}

fn render_fields(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub fields: Vec<(String, String)>
}

impl RecordedEvent {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    pub fn find(&self, message: &str) -> Option<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .find(|e| e.message.contains(message))
            .cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, String)]) {
        self.events.lock().push(RecordedEvent {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_events() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.log(
            LogLevel::Warn,
            "retrieval degraded",
            &[("correlation_id", "abc".to_string())]
        );
        sink.log(LogLevel::Info, "enrichment complete", &[]);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count_at(LogLevel::Warn), 1);
        let event = sink.find("degraded").unwrap();
        assert_eq!(event.field("correlation_id"), Some("abc"));
        assert_eq!(event.field("missing"), None);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_memory_sink_as_trait_object() {
        let sink = MemorySink::new();
        let dyn_sink: &dyn EventSink = &sink;
        dyn_sink.log(LogLevel::Error, "boom", &[]);
        assert_eq!(sink.count_at(LogLevel::Error), 1);
    }

    #[test]
    fn test_tracing_sink_without_subscriber() {
        TracingSink.log(LogLevel::Info, "no subscriber installed", &[("k", "v".into())]);
    }

    #[test]
    fn test_render_fields() {
        assert_eq!(
            render_fields(&[("a", "1".to_string()), ("b", "two".to_string())]),
            "a=1 b=two"
        );
        assert_eq!(render_fields(&[]), "");
    }
}
