//! Observable workflow events.
//!
//! The approval workflow reports every step through an injected
//! [`EventSink`]. There is no process-wide sink: callers pass one in.

mod sink;

pub use sink::{CollectingEventSink, Event, EventSink, LoggingEventSink, NoOpEventSink};
