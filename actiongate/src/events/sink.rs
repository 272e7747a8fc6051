//! Event sink trait and implementations.

use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};

/// An observable event about one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dotted event type (e.g. `workflow.step.completed`).
    pub event_type: String,
    /// The action the event is about.
    pub action_id: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the event was emitted.
    pub emitted_at: Timestamp,
}

impl Event {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        action_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            action_id: action_id.into(),
            data,
            emitted_at: now_utc(),
        }
    }
}

/// Receiver of workflow events.
///
/// Sinks must never fail the caller: errors are swallowed inside the sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: Event);

    /// Emits an event without awaiting.
    fn try_emit(&self, event: Event);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}

    fn try_emit(&self, _event: Event) {}
}

/// Logs events through `tracing`.
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
    /// Creates a sink logging at `level` (DEBUG or INFO).
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, event: &Event) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                action_id = %event.action_id,
                data = %event.data,
                "workflow event"
            );
        } else {
            info!(
                event_type = %event.event_type,
                action_id = %event.action_id,
                data = %event.data,
                "workflow event"
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: Event) {
        self.log(&event);
    }

    fn try_emit(&self, event: Event) {
        self.log(&event);
    }
}

/// Keeps events in memory; used by tests to observe workflow steps.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the `step` field of every event of the given type.
    #[must_use]
    pub fn steps(&self, event_type: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.data.get("step").and_then(|s| s.as_str()).map(String::from))
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: Event) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: Event) {
        self.events.write().push(event);
    }
}
