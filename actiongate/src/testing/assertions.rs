//! Assertions for tool results and persisted actions.

use crate::actions::{ActionStatus, ActionStore, ApprovalStatus};
use crate::errors::ErrorCode;
use crate::tools::ToolResult;

/// Asserts that the result is a success.
pub fn assert_tool_succeeded<T: std::fmt::Debug>(result: &ToolResult<T>) {
    assert!(
        result.is_success(),
        "Expected success, got error: {:?}",
        result.error_info()
    );
}

/// Asserts that the result failed with `code`.
pub fn assert_tool_failed_with<T: std::fmt::Debug>(result: &ToolResult<T>, code: ErrorCode) {
    assert_eq!(
        result.error_code(),
        Some(code),
        "Expected failure with {code}, got {result:?}"
    );
}

/// Asserts that the stored action has `status` and, when it has an approval
/// request, that the request mirrors it.
pub async fn assert_action_settled(store: &dyn ActionStore, action_id: &str, status: ActionStatus) {
    let action = store
        .get_action(action_id)
        .await
        .expect("store read failed")
        .unwrap_or_else(|| panic!("action {action_id} not found"));
    assert_eq!(action.status, status, "action {action_id} status");

    if let Some(request) = store
        .get_approval_request(action_id)
        .await
        .expect("store read failed")
    {
        assert_eq!(
            request.status,
            ApprovalStatus::mirroring(status),
            "approval request for {action_id} does not mirror the action"
        );
    }
}
