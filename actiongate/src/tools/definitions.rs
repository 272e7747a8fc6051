//! Tool definitions, handlers and approval predicates.

use crate::context::ExecutionContext;
use crate::errors::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Name, description and input schema of a tool.
///
/// This is what an agent sees when tools are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// The unique tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a definition accepting any object.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// The executor behind a tool.
#[async_trait]
pub trait ToolHandler<P: Send + 'static, O>: Send + Sync {
    /// Runs the tool with validated parameters.
    async fn call(&self, params: P, ctx: &ExecutionContext) -> Result<O, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

/// Wraps `f` as a handler. The closure receives its own copy of the context.
pub const fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler(f)
}

#[async_trait]
impl<P, O, F, Fut> ToolHandler<P, O> for FnHandler<F>
where
    P: Send + 'static,
    F: Fn(P, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ToolError>> + Send,
{
    async fn call(&self, params: P, ctx: &ExecutionContext) -> Result<O, ToolError> {
        (self.0)(params, ctx.clone()).await
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

/// Decides whether a call needs human approval. Must be pure: read time only
/// through the context's clock.
pub type ApprovalPredicate<P> = Arc<dyn Fn(&P, &ExecutionContext) -> bool + Send + Sync>;
