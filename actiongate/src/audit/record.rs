//! Audit records.

use crate::errors::{ErrorCode, ToolErrorInfo};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Result half of an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The tool succeeded with this result.
    Success {
        /// The serialized tool output.
        result: serde_json::Value,
    },
    /// The tool failed with this error.
    Error {
        /// The error payload.
        error: ToolErrorInfo,
    },
}

/// One tool invocation as seen by the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// The tool name.
    pub tool_name: String,
    /// The raw parameters.
    pub parameters: serde_json::Value,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: AuditOutcome,
    /// Time from pre-execute to post-execute/error, in milliseconds.
    pub duration_ms: u64,
    /// The invocation's trace id.
    pub trace_id: String,
    /// The conversation id.
    pub conversation_id: String,
    /// The app id.
    pub app_id: String,
    /// When the record was written.
    pub recorded_at: Timestamp,
}

impl AuditRecord {
    /// Whether the tool succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Success { .. })
    }

    /// The error code, when the tool failed.
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match &self.outcome {
            AuditOutcome::Success { .. } => None,
            AuditOutcome::Error { error } => Some(error.code),
        }
    }

    /// Whether money moved but downstream reconciliation is still pending.
    #[must_use]
    pub fn requires_reconciliation(&self) -> bool {
        self.error_code() == Some(ErrorCode::PartialCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(outcome: AuditOutcome) -> AuditRecord {
        AuditRecord {
            tool_name: "processRefund".into(),
            parameters: serde_json::json!({"purchaseId": "order-456"}),
            outcome,
            duration_ms: 12,
            trace_id: "t1".into(),
            conversation_id: "c1".into(),
            app_id: "app-1".into(),
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_success_record_shape() {
        let json = serde_json::to_value(record(AuditOutcome::Success {
            result: serde_json::json!({"amountRefunded": 100}),
        }))
        .unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["amountRefunded"], 100);
        assert_eq!(json["toolName"], "processRefund");
        assert_eq!(json["durationMs"], 12);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_partial_completion_is_flagged() {
        let rec = record(AuditOutcome::Error {
            error: ToolErrorInfo::new(ErrorCode::PartialCompletion, "refund applied, revoke failed"),
        });
        assert!(rec.requires_reconciliation());
        assert!(!rec.is_success());

        let generic = record(AuditOutcome::Error {
            error: ToolErrorInfo::new(ErrorCode::ExecutionError, "boom"),
        });
        assert!(!generic.requires_reconciliation());
    }

    #[test]
    fn test_record_deserializes_back() {
        let original = record(AuditOutcome::Error {
            error: ToolErrorInfo::not_found("purchase not found: order-9"),
        });
        let json = serde_json::to_string(&original).unwrap();
        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.error_code(), Some(ErrorCode::NotFound));
    }
}
