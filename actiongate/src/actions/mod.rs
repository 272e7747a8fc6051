//! Actions, approval requests and their lifecycle.
//!
//! An [`Action`] is a proposed side effect; when the approval gate fires it
//! gets a 1:1 [`ApprovalRequest`]. Both live in an [`ActionStore`], whose
//! compare-and-set `update_status` is the only way to claim an action for
//! execution.

mod model;
mod service;
mod store;

pub use model::{
    Action, ActionStatus, ApprovalRequest, ApprovalStatus, ApprovalUpdate, StatusUpdate, ToolCall,
    PENDING_ACTION_TYPE,
};
pub use service::{ActionService, Proposal, AUTO_APPROVER};
pub use store::{ActionStore, InMemoryActionStore, StoreOperation};
