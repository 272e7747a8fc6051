//! Event-driven completion of approved actions.

mod approval;
mod events;
mod retry;

#[cfg(test)]
mod integration_tests;

pub use approval::{
    verify_completion, ApprovalWorkflow, ContextLoader, SkipReason, WorkflowOutcome,
    STEP_EXECUTE_TOOL, STEP_LOOKUP_ACTION, STEP_UPDATE_ACTION_STATUS,
    STEP_UPDATE_APPROVAL_REQUEST,
};
pub use events::ActionApproved;
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig};
