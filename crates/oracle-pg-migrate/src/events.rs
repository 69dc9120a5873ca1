//! Progress events emitted by the migration core.
//!
//! Components never print. They hand messages to an [`EventSink`] owned by the
//! run; the default [`TracingSink`] forwards them to `tracing`.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationEvent {
    pub level: EventLevel,
    pub message: String,
}

/// Receiver of progress and diagnostic events.
pub trait EventSink: Send + Sync {
    fn emit(&self, level: EventLevel, message: &str);

    fn debug(&self, message: &str) {
        self.emit(EventLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.emit(EventLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(EventLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.emit(EventLevel::Error, message);
    }
}

/// Shared handle to the run's sink.
pub type SharedSink = Arc<dyn EventSink>;

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, level: EventLevel, message: &str) {
        match level {
            EventLevel::Debug => tracing::debug!("{}", message),
            EventLevel::Info => tracing::info!("{}", message),
            EventLevel::Warn => tracing::warn!("{}", message),
            EventLevel::Error => tracing::error!("{}", message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<MigrationEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events so far.
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events at exactly `level`.
    pub fn at_level(&self, level: EventLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    /// Whether any event at `level` contains `needle`.
    pub fn contains(&self, level: EventLevel, needle: &str) -> bool {
        self.at_level(level).iter().any(|m| m.contains(needle))
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, level: EventLevel, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MigrationEvent {
                level,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_records_in_order() {
        let sink = CollectingSink::new();
        sink.info("Began copy of sales.orders");
        sink.warn("mismatch");
        sink.debug("NULL DETECTED");

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].level, EventLevel::Info);
        assert!(sink.contains(EventLevel::Warn, "mismatch"));
        assert!(!sink.contains(EventLevel::Error, "mismatch"));
        assert_eq!(sink.at_level(EventLevel::Debug), vec!["NULL DETECTED".to_string()]);
    }

    #[test]
    fn test_sink_usable_as_trait_object() {
        let sink: SharedSink = Arc::new(CollectingSink::new());
        sink.error("boom");
        TracingSink.info("forwarded");
    }
}
