//! Event sink trait and implementations.

use super::ScoringEvent;
use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

/// Receives lifecycle events from a scoring run.
///
/// The scorer calls `emit` from its coordinating task. Implementations must
/// not fail the run; errors are theirs to log and swallow.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &ScoringEvent);

    /// Emits an event without awaiting.
    fn try_emit(&self, event: &ScoringEvent);
}

/// Discards all events. The scorer's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &ScoringEvent) {}

    fn try_emit(&self, _event: &ScoringEvent) {}
}

/// Logs events through `tracing`.
///
/// Batch failures and cancellations are always logged at `WARN`; other
/// events use the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging event sink that emits at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ScoringEvent) {
        let data = serde_json::to_value(event).ok();
        match event {
            ScoringEvent::BatchFailed { .. } | ScoringEvent::Cancelled { .. } => {
                warn!(event_type = event.event_type(), event_data = ?data, "Event: {}", event.event_type());
            }
            _ if self.level == Level::DEBUG => {
                debug!(event_type = event.event_type(), event_data = ?data, "Event: {}", event.event_type());
            }
            _ => {
                info!(event_type = event.event_type(), event_data = ?data, "Event: {}", event.event_type());
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &ScoringEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &ScoringEvent) {
        self.log_event(event);
    }
}

/// Collects events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<ScoringEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every collected event.
    #[must_use]
    pub fn events(&self) -> Vec<ScoringEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<ScoringEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &ScoringEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &ScoringEvent) {
        self.events.write().push(event.clone());
    }
}
