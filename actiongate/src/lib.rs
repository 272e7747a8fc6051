//! # Actiongate
//!
//! Approval-gated, idempotent execution of customer-support actions.
//!
//! An agent proposes tool calls (refunds, lookups). Calls the approval gate
//! lets through run immediately; the rest wait for a human. Approving an
//! action publishes an event that drives it through the workflow exactly
//! once, however often the event is delivered:
//!
//! - **Tools**: JSON-Schema validated, typed, never panic into the caller
//! - **Approval gate**: pure predicates over parameters and an injected clock
//! - **Action store**: monotonic state machine with a compare-and-set claim
//! - **Workflow**: observable, retryable steps with idempotent resumption
//! - **Payments**: idempotency-keyed refunds with typed vendor replies
//! - **Audit trail**: injected hooks that can never change a tool's outcome
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use actiongate::prelude::*;
//!
//! let config = load_config(None)?;
//! init_tracing(&config.logging);
//! let engine = Engine::from_config(config, processor, integration, store, loader)?;
//! let service = engine.service();
//!
//! match service.propose("processRefund", json!({"purchaseId": "order-456"}), &ctx).await? {
//!     Proposal::AutoApproved { outcome, .. } => println!("{outcome:?}"),
//!     Proposal::PendingApproval { action, .. } => {
//!         let event = service.approve(&action.id, "ops@example.com").await?;
//!         engine.workflow().handle(&event).await?;
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod actions;
pub mod approval;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod payments;
pub mod testing;
pub mod tools;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{
        Action, ActionService, ActionStatus, ActionStore, ApprovalRequest, ApprovalStatus,
        InMemoryActionStore, Proposal, ToolCall,
    };
    pub use crate::approval::{evaluate_refund, refund_requires_approval, GateDecision};
    pub use crate::audit::{
        AuditRecord, AuditSink, AuditTrail, InMemoryAuditSink, JsonlAuditSink, ToolHooks,
        TracingAuditSink,
    };
    pub use crate::catalog::register_support_tools;
    pub use crate::config::EngineConfig;
    pub use crate::context::{AppConfig, ExecutionContext, Purchase, UserIdentity};
    pub use crate::engine::{load_config, Engine};
    pub use crate::errors::{
        ActiongateError, ErrorCode, StoreError, ToolError, ToolErrorInfo, WorkflowError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_tracing;
    pub use crate::payments::{
        AppIntegration, CapabilityReply, PaymentProcessor, RefundExecutor, RefundReceipt,
    };
    pub use crate::tools::{Tool, ToolDefinition, ToolRegistry, ToolResult};
    pub use crate::utils::{Clock, SystemClock, Timestamp};
    pub use crate::workflow::{
        verify_completion, ActionApproved, ApprovalWorkflow, ContextLoader, RetryConfig,
        WorkflowOutcome,
    };
}
