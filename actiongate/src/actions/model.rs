//! Durable action and approval-request records.

use crate::errors::ToolErrorInfo;
use crate::utils::{new_id, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action type whose parameters carry a list of recorded tool calls.
pub const PENDING_ACTION_TYPE: &str = "pending-action";

/// Lifecycle of an action.
///
/// `proposed → approved → executing → {executed | failed}`, plus
/// `proposed → rejected`. Transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Awaiting a human decision.
    Proposed,
    /// Approved, not yet claimed.
    Approved,
    /// Claimed by exactly one worker.
    Executing,
    /// Completed successfully.
    Executed,
    /// Completed with a failure.
    Failed,
    /// Rejected by a human.
    Rejected,
}

impl ActionStatus {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    /// Whether `self → next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Approved | Self::Rejected)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Executed | Self::Failed)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Rejected)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an approval request; its terminal state mirrors the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a human.
    Pending,
    /// Approved by a human.
    Approved,
    /// Rejected by a human.
    Rejected,
    /// The approved action executed.
    Executed,
    /// The approved action failed.
    Failed,
}

impl ApprovalStatus {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }

    /// Whether `self → next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
                | (Self::Approved, Self::Executed | Self::Failed)
        )
    }

    /// The approval status that mirrors an action status.
    #[must_use]
    pub const fn mirroring(status: ActionStatus) -> Self {
        match status {
            ActionStatus::Proposed => Self::Pending,
            ActionStatus::Approved | ActionStatus::Executing => Self::Approved,
            ActionStatus::Executed => Self::Executed,
            ActionStatus::Failed => Self::Failed,
            ActionStatus::Rejected => Self::Rejected,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The tool name.
    pub name: String,
    /// The raw arguments.
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedCalls {
    tool_calls: Vec<ToolCall>,
}

/// A proposed side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// The action ID.
    pub id: String,
    /// The action type: a tool name or [`PENDING_ACTION_TYPE`].
    #[serde(rename = "type")]
    pub action_type: String,
    /// Opaque parameters.
    pub parameters: serde_json::Value,
    /// The originating conversation.
    pub conversation_id: String,
    /// The app the action belongs to.
    pub app_id: String,
    /// Current status.
    pub status: ActionStatus,
    /// Output of a successful execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error of a failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,
    /// Token of the worker holding the execution claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// When the current claim was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<Timestamp>,
    /// When the action was created.
    pub created_at: Timestamp,
    /// When the action last changed.
    pub updated_at: Timestamp,
}

impl Action {
    /// Creates a proposed action invoking one tool.
    #[must_use]
    pub fn new(
        action_type: impl Into<String>,
        parameters: serde_json::Value,
        conversation_id: impl Into<String>,
        app_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_id("act"),
            action_type: action_type.into(),
            parameters,
            conversation_id: conversation_id.into(),
            app_id: app_id.into(),
            status: ActionStatus::Proposed,
            result: None,
            error: None,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a proposed action carrying several recorded tool calls.
    #[must_use]
    pub fn pending(
        calls: &[ToolCall],
        conversation_id: impl Into<String>,
        app_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self::new(
            PENDING_ACTION_TYPE,
            serde_json::json!({ "toolCalls": calls }),
            conversation_id,
            app_id,
            now,
        )
    }

    /// Overrides the generated ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: ActionStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the action is executing under a claim taken at or before
    /// `stale_before`. A claim with no timestamp counts as stale.
    #[must_use]
    pub fn claim_is_stale(&self, stale_before: Timestamp) -> bool {
        self.status == ActionStatus::Executing
            && self.claimed_at.map_or(true, |at| at <= stale_before)
    }

    /// Resolves the tool calls this action stands for.
    ///
    /// A `pending-action` lists them under `toolCalls`; any other type names
    /// a single tool whose arguments are the parameters.
    pub fn tool_calls(&self) -> Result<Vec<ToolCall>, serde_json::Error> {
        if self.action_type == PENDING_ACTION_TYPE {
            let recorded: RecordedCalls = serde_json::from_value(self.parameters.clone())?;
            Ok(recorded.tool_calls)
        } else {
            Ok(vec![ToolCall::new(&self.action_type, self.parameters.clone())])
        }
    }
}

/// Human approval record for an action (1:1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// The request ID.
    pub id: String,
    /// The action this request gates.
    pub action_id: String,
    /// Current status.
    pub status: ApprovalStatus,
    /// Who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// When the decision was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<Timestamp>,
    /// Rejection reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the request was created.
    pub created_at: Timestamp,
    /// When the request last changed.
    pub updated_at: Timestamp,
}

impl ApprovalRequest {
    /// Creates a pending request for an action.
    #[must_use]
    pub fn pending(action_id: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: new_id("apr"),
            action_id: action_id.into(),
            status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this request mirrors the given action status.
    #[must_use]
    pub fn mirrors(&self, status: ActionStatus) -> bool {
        ApprovalStatus::mirroring(status) == self.status
    }
}

/// A guarded action status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// The new status.
    pub status: ActionStatus,
    /// Output to record.
    pub result: Option<serde_json::Value>,
    /// Error to record.
    pub error: Option<ToolErrorInfo>,
    /// Claim token. Taking a claim records it; finishing requires it to
    /// still be the stored one.
    pub claimed_by: Option<String>,
}

impl StatusUpdate {
    /// Moves to `status` without recording an outcome.
    #[must_use]
    pub const fn to(status: ActionStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
            claimed_by: None,
        }
    }

    /// Records a successful outcome.
    #[must_use]
    pub fn executed(result: serde_json::Value) -> Self {
        Self {
            status: ActionStatus::Executed,
            result: Some(result),
            error: None,
            claimed_by: None,
        }
    }

    /// Records a failed outcome.
    #[must_use]
    pub fn failed(error: ToolErrorInfo) -> Self {
        Self {
            status: ActionStatus::Failed,
            result: None,
            error: Some(error),
            claimed_by: None,
        }
    }

    /// Claims an approved action for the worker holding `token`.
    #[must_use]
    pub fn claim(token: impl Into<String>) -> Self {
        Self::to(ActionStatus::Executing).with_claim(token)
    }

    /// Attaches the claim token this update is made under.
    #[must_use]
    pub fn with_claim(mut self, token: impl Into<String>) -> Self {
        self.claimed_by = Some(token.into());
        self
    }
}

/// A change to an approval request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalUpdate {
    /// The new status.
    pub status: ApprovalStatus,
    /// Who decided, when the update is a decision.
    pub approved_by: Option<String>,
    /// When the decision was made.
    pub approved_at: Option<Timestamp>,
    /// Rejection reason.
    pub reason: Option<String>,
}

impl ApprovalUpdate {
    /// Moves to `status`.
    #[must_use]
    pub const fn to(status: ApprovalStatus) -> Self {
        Self {
            status,
            approved_by: None,
            approved_at: None,
            reason: None,
        }
    }

    /// Records who decided and when.
    #[must_use]
    pub fn decided_by(mut self, who: impl Into<String>, at: Timestamp) -> Self {
        self.approved_by = Some(who.into());
        self.approved_at = Some(at);
        self
    }

    /// Records a rejection reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_transitions_are_monotonic() {
        use ActionStatus::*;

        assert!(Proposed.can_transition_to(Approved));
        assert!(Proposed.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Executed));
        assert!(Executing.can_transition_to(Failed));

        assert!(!Approved.can_transition_to(Proposed));
        assert!(!Executing.can_transition_to(Approved));
        assert!(!Executed.can_transition_to(Executing));
        assert!(!Failed.can_transition_to(Executed));
        assert!(!Approved.can_transition_to(Executed));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ActionStatus::Executed.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
        assert!(!ActionStatus::Executing.is_terminal());
    }

    #[test]
    fn test_approval_mirrors_action() {
        let mut request = ApprovalRequest::pending("action-1", chrono::Utc::now());
        request.status = ApprovalStatus::Executed;

        assert!(request.mirrors(ActionStatus::Executed));
        assert!(!request.mirrors(ActionStatus::Failed));
    }

    #[test]
    fn test_single_tool_call() {
        let action = Action::new(
            "processRefund",
            serde_json::json!({"purchaseId": "order-456"}),
            "cnv_1",
            "app-1",
            chrono::Utc::now(),
        );

        let calls = action.tool_calls().unwrap();
        assert_eq!(
            calls,
            vec![ToolCall::new("processRefund", serde_json::json!({"purchaseId": "order-456"}))]
        );
    }

    #[test]
    fn test_pending_action_tool_calls() {
        let calls = vec![
            ToolCall::new("getProductStatus", serde_json::json!({"productId": "p1"})),
            ToolCall::new("processRefund", serde_json::json!({"purchaseId": "o1"})),
        ];
        let action = Action::pending(&calls, "cnv_1", "app-1", chrono::Utc::now());

        assert_eq!(action.action_type, PENDING_ACTION_TYPE);
        assert_eq!(action.tool_calls().unwrap(), calls);
    }

    #[test]
    fn test_malformed_pending_action() {
        let action = Action::new(
            PENDING_ACTION_TYPE,
            serde_json::json!({"calls": []}),
            "cnv_1",
            "app-1",
            chrono::Utc::now(),
        );
        assert!(action.tool_calls().is_err());
    }

    #[test]
    fn test_claim_staleness() {
        let claimed_at = chrono::Utc::now();
        let mut action = Action::new("processRefund", serde_json::json!({}), "c", "a", claimed_at)
            .with_status(ActionStatus::Executing);
        assert!(action.claim_is_stale(claimed_at));

        action.claimed_at = Some(claimed_at);
        assert!(action.claim_is_stale(claimed_at));
        assert!(!action.claim_is_stale(claimed_at - chrono::Duration::seconds(1)));

        action.status = ActionStatus::Executed;
        assert!(!action.claim_is_stale(claimed_at + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_action_wire_format() {
        let action =
            Action::new("processRefund", serde_json::json!({}), "c", "a", chrono::Utc::now())
                .with_id("action-123");
        let json = serde_json::to_value(&action).unwrap();

        assert_eq!(json["type"], "processRefund");
        assert_eq!(json["status"], "proposed");
        assert_eq!(json["conversationId"], "c");
    }
}
