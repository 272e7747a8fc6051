//! Testing utilities for actiongate.
//!
//! This module provides:
//! - Deterministic fixtures (clock, customer, purchases, contexts)
//! - Fake collaborators (payment processor, app integration, context loader)
//! - Assertions for tool results and persisted actions

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_action_settled, assert_tool_failed_with, assert_tool_succeeded};
pub use mocks::{FakePaymentProcessor, RecordingIntegration, StaticContextLoader};
