//! Hook trait invoked around every tool execution.

use crate::context::ExecutionContext;
use crate::errors::{HookError, ToolErrorInfo};
use async_trait::async_trait;

/// What a hook learns about the invocation it observes.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    /// The tool name.
    pub tool_name: String,
    /// The raw parameters as received.
    pub parameters: serde_json::Value,
    /// The invocation's trace id.
    pub trace_id: String,
    /// The conversation id.
    pub conversation_id: String,
    /// The app id.
    pub app_id: String,
}

impl HookContext {
    /// Captures the correlation data of `ctx` for a call to `tool_name`.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        parameters: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            trace_id: ctx.trace_id().to_string(),
            conversation_id: ctx.conversation_id().to_string(),
            app_id: ctx.app().id.clone(),
        }
    }
}

/// Instrumentation around tool execution.
///
/// `before_execute` runs only for calls whose input validated;
/// `on_error` runs for validation and executor failures alike.
#[async_trait]
pub trait ToolHooks: Send + Sync {
    /// Called before the executor runs.
    async fn before_execute(&self, _call: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after the executor succeeded.
    async fn after_execute(
        &self,
        _call: &HookContext,
        _result: &serde_json::Value,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when validation or the executor failed.
    async fn on_error(&self, _call: &HookContext, _error: &ToolErrorInfo) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that observe nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHooks;

impl ToolHooks for NoOpHooks {}
