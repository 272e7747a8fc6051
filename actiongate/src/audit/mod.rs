//! Audit trail: pre/post/error instrumentation of tool execution.
//!
//! Hooks are an injected dependency carried by the
//! [`ExecutionContext`](crate::context::ExecutionContext). They observe tool
//! execution but can never change its outcome: the tool layer catches and
//! logs every hook failure.

mod hooks;
mod record;
mod sink;
mod trail;

pub use hooks::{HookContext, NoOpHooks, ToolHooks};
pub use record::{AuditOutcome, AuditRecord};
pub use sink::{AuditSink, InMemoryAuditSink, JsonlAuditSink, TracingAuditSink};
pub use trail::AuditTrail;
