//! Error types and machine-readable error codes.
//!
//! Every failure that reaches a caller carries an [`ErrorCode`] and a human
//! message. Tool failures are flattened into [`ToolErrorInfo`], which is the
//! `error` half of a [`ToolResult`](crate::tools::ToolResult).

use crate::actions::{ActionStatus, ApprovalStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for actiongate operations.
#[derive(Debug, Error)]
pub enum ActiongateError {
    /// A tool registration error.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A durable store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A workflow error.
    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    /// A configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad input; the executor never ran.
    ValidationError,
    /// The executor or an immediate dependency failed.
    ExecutionError,
    /// An action, purchase, app or tool is missing.
    NotFound,
    /// The side effect was already applied (resolved to success).
    AlreadyApplied,
    /// The vendor rejected the call for authorization reasons.
    AuthorizationError,
    /// The financial effect applied but downstream reconciliation failed.
    PartialCompletion,
    /// The backend does not implement the requested capability.
    NotImplemented,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyApplied => "ALREADY_APPLIED",
            Self::AuthorizationError => "AUTHORIZATION_ERROR",
            Self::PartialCompletion => "PARTIAL_COMPLETION",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        }
    }

    /// Whether an operator may retry an operation that failed with this code.
    ///
    /// Validation, authorization and partial-completion failures need a
    /// human; only execution errors are candidates for a retry.
    #[must_use]
    pub const fn allows_retry(self) -> bool {
        matches!(self, Self::ExecutionError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable error payload of a failed tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorInfo {
    /// The error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ToolErrorInfo {
    /// Creates a new error payload.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Creates a validation error payload.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::new(ErrorCode::ValidationError, message).with_details(details)
    }

    /// Creates a not-found error payload.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl fmt::Display for ToolErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors raised by tool executors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Input was rejected.
    #[error("{message}")]
    Validation {
        /// The error message.
        message: String,
        /// Optional structured details.
        details: Option<serde_json::Value>,
    },

    /// A referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// The resource kind (e.g. "purchase").
        resource: String,
        /// The missing identifier.
        id: String,
    },

    /// The vendor rejected the call for authorization reasons.
    #[error("{message}")]
    Authorization {
        /// The vendor's message, verbatim.
        message: String,
    },

    /// The vendor declined the call.
    #[error("{message}")]
    Declined {
        /// The vendor's message, verbatim.
        message: String,
    },

    /// The backend does not implement a capability.
    #[error("{capability} is not implemented by this app's integration")]
    NotImplemented {
        /// The capability name.
        capability: String,
    },

    /// The financial effect applied but reconciliation did not.
    #[error("{message}")]
    PartialCompletion {
        /// The error message.
        message: String,
        /// Receipt of the applied effect plus the reconciliation failure.
        details: serde_json::Value,
    },

    /// A dependency did not answer in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A dependency is temporarily unreachable.
    #[error("{operation} unavailable: {message}")]
    Unavailable {
        /// The operation that failed.
        operation: String,
        /// The transport message.
        message: String,
    },

    /// The executor panicked.
    #[error("executor panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// Any other executor failure.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl ToolError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Creates a not-implemented error.
    #[must_use]
    pub fn not_implemented(capability: impl Into<String>) -> Self {
        Self::NotImplemented {
            capability: capability.into(),
        }
    }

    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Authorization { .. } => ErrorCode::AuthorizationError,
            Self::NotImplemented { .. } => ErrorCode::NotImplemented,
            Self::PartialCompletion { .. } => ErrorCode::PartialCompletion,
            Self::Declined { .. }
            | Self::Timeout { .. }
            | Self::Unavailable { .. }
            | Self::Panicked { .. }
            | Self::Execution(_) => ErrorCode::ExecutionError,
        }
    }

    /// Whether the failure is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    /// Flattens the error into its serializable payload.
    #[must_use]
    pub fn to_info(&self) -> ToolErrorInfo {
        let info = ToolErrorInfo::new(self.code(), self.to_string());
        match self {
            Self::Validation {
                details: Some(details),
                ..
            }
            | Self::PartialCompletion { details, .. } => info.with_details(details.clone()),
            Self::NotFound { resource, id } => {
                info.with_details(serde_json::json!({ "resource": resource, "id": id }))
            }
            Self::Timeout { .. } | Self::Unavailable { .. } => {
                info.with_details(serde_json::json!({ "retryable": true }))
            }
            Self::Panicked { message } => {
                info.with_details(serde_json::json!({ "panic": message }))
            }
            Self::Execution(err) => info.with_details(serde_json::json!({
                "chain": err.chain().map(ToString::to_string).collect::<Vec<_>>(),
                "stack": format!("{err:?}"),
            })),
            _ => info,
        }
    }
}

/// Errors raised while registering tools.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("Tool already registered: {name}")]
    Duplicate {
        /// The tool name.
        name: String,
    },

    /// The tool's input schema does not compile.
    #[error("Invalid input schema for tool {name}: {message}")]
    InvalidSchema {
        /// The tool name.
        name: String,
        /// The compiler message.
        message: String,
    },
}

/// Errors raised by the durable action store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The record kind.
        kind: &'static str,
        /// The record identifier.
        id: String,
    },

    /// A record with this identifier already exists.
    #[error("{kind} already exists: {id}")]
    Duplicate {
        /// The record kind.
        kind: &'static str,
        /// The record identifier.
        id: String,
    },

    /// The guarded update found a different status.
    #[error("Action {id} status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        /// The action identifier.
        id: String,
        /// The status the caller expected.
        expected: ActionStatus,
        /// The status actually stored.
        actual: ActionStatus,
    },

    /// The action is executing under another worker's live claim.
    #[error("Action {id} is claimed by another worker")]
    ClaimHeld {
        /// The action identifier.
        id: String,
        /// The current claim token.
        claimed_by: Option<String>,
    },

    /// The requested action transition is not allowed.
    #[error("Invalid action transition: {from} -> {to}")]
    InvalidTransition {
        /// The current status.
        from: ActionStatus,
        /// The requested status.
        to: ActionStatus,
    },

    /// The requested approval-request transition is not allowed.
    #[error("Invalid approval request transition: {from} -> {to}")]
    InvalidApprovalTransition {
        /// The current status.
        from: ApprovalStatus,
        /// The requested status.
        to: ApprovalStatus,
    },

    /// The backing store is temporarily unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the failure is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors raised by the approval workflow and the action service.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// The approved action does not exist.
    #[error("Action not found: {action_id}")]
    ActionNotFound {
        /// The action identifier.
        action_id: String,
    },

    /// The action is not in a state that accepts this operation.
    #[error("Action {action_id} is {status}, expected {expected}")]
    UnexpectedStatus {
        /// The action identifier.
        action_id: String,
        /// The current status.
        status: ActionStatus,
        /// The status the operation requires.
        expected: ActionStatus,
    },

    /// No tool with this name is registered.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The tool name.
        name: String,
    },

    /// The execution context for an action could not be built.
    #[error("Failed to load context for action {action_id}: {message}")]
    Context {
        /// The action identifier.
        action_id: String,
        /// The loader's message.
        message: String,
        /// Whether the loader failure is transient.
        retryable: bool,
    },

    /// The action and its approval request disagree.
    #[error("Action {action_id} is {action_status} but its approval request is {approval_status}")]
    Inconsistent {
        /// The action identifier.
        action_id: String,
        /// The action status.
        action_status: ActionStatus,
        /// The approval request status.
        approval_status: ApprovalStatus,
    },

    /// The action has been executing longer than its claim lease.
    #[error("Action {action_id} has been executing since {since} without finishing")]
    StaleClaim {
        /// The action identifier.
        action_id: String,
        /// When the claim was taken.
        since: Timestamp,
    },

    /// A store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Whether the failing step may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Context { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ActionNotFound { .. } | Self::UnknownTool { .. } => ErrorCode::NotFound,
            Self::Store(StoreError::NotFound { .. }) => ErrorCode::NotFound,
            Self::UnexpectedStatus { .. } => ErrorCode::ValidationError,
            Self::Inconsistent { .. } | Self::StaleClaim { .. } => ErrorCode::PartialCompletion,
            Self::Context { .. } | Self::Store(_) => ErrorCode::ExecutionError,
        }
    }
}

/// Errors raised by audit hooks and sinks.
#[derive(Debug, Error)]
pub enum HookError {
    /// The sink rejected the write.
    #[error("Audit sink error: {0}")]
    Sink(String),

    /// The sink did not accept the write in time.
    #[error("Audit sink write timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for the expected shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override holds an unusable value.
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv {
        /// The variable name.
        key: String,
        /// The offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_value(ErrorCode::PartialCompletion).unwrap();
        assert_eq!(json, serde_json::json!("PARTIAL_COMPLETION"));
        assert_eq!(ErrorCode::ValidationError.to_string(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_only_execution_errors_allow_retry() {
        assert!(ErrorCode::ExecutionError.allows_retry());
        assert!(!ErrorCode::ValidationError.allows_retry());
        assert!(!ErrorCode::AuthorizationError.allows_retry());
        assert!(!ErrorCode::PartialCompletion.allows_retry());
    }

    #[test]
    fn test_tool_error_codes() {
        assert_eq!(ToolError::validation("bad").code(), ErrorCode::ValidationError);
        assert_eq!(ToolError::not_found("purchase", "p1").code(), ErrorCode::NotFound);
        assert_eq!(
            ToolError::Authorization { message: "nope".into() }.code(),
            ErrorCode::AuthorizationError
        );
        assert_eq!(ToolError::not_implemented("revoke-access").code(), ErrorCode::NotImplemented);
        assert_eq!(
            ToolError::Execution(anyhow::anyhow!("boom")).code(),
            ErrorCode::ExecutionError
        );
    }

    #[test]
    fn test_execution_error_info_carries_chain() {
        let err = ToolError::Execution(anyhow::anyhow!("root cause").context("while refunding"));
        let info = err.to_info();

        assert_eq!(info.code, ErrorCode::ExecutionError);
        assert_eq!(info.message, "while refunding");
        let chain = info.details.unwrap()["chain"].clone();
        assert_eq!(chain, serde_json::json!(["while refunding", "root cause"]));
    }

    #[test]
    fn test_transient_tool_errors_are_retryable() {
        let timeout = ToolError::Timeout {
            operation: "create-refund".into(),
            timeout_ms: 100,
        };
        assert!(timeout.is_retryable());
        assert!(!ToolError::validation("x").is_retryable());
    }

    #[test]
    fn test_workflow_error_retryability() {
        assert!(WorkflowError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!WorkflowError::ActionNotFound { action_id: "a".into() }.is_retryable());
        assert_eq!(
            WorkflowError::ActionNotFound { action_id: "a".into() }.code(),
            ErrorCode::NotFound
        );
    }
}
