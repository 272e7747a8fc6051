//! Per-invocation execution context.
//!
//! An [`ExecutionContext`] bundles who the customer is, what they bought,
//! which app they bought it from, and the correlation ids of the current
//! invocation. It also carries the injected clock and audit hooks so that
//! nothing downstream reaches for process-wide state.

mod execution;
mod identity;

pub use execution::ExecutionContext;
pub use identity::{AppConfig, Purchase, PurchaseStatus, UserIdentity};
