//! Tool registry shared by the agent surface and the approval workflow.

use super::tool::guard_hook;
use super::{Tool, ToolDefinition, ToolResult};
use crate::audit::HookContext;
use crate::context::ExecutionContext;
use crate::errors::{RegistryError, ToolErrorInfo};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Type-erased view of a [`Tool`], so tools with different parameter and
/// output types share one registry.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Returns the definition.
    fn definition(&self) -> &ToolDefinition;

    /// Whether these raw parameters need approval (fails closed).
    fn requires_approval(&self, raw: &serde_json::Value, ctx: &ExecutionContext) -> bool;

    /// Executes with raw parameters, returning JSON output.
    async fn execute(&self, raw: serde_json::Value, ctx: &ExecutionContext)
        -> ToolResult<serde_json::Value>;
}

#[async_trait]
impl<P, O> DynTool for Tool<P, O>
where
    P: DeserializeOwned + Send + Sync + 'static,
    O: Serialize + Send + Sync + 'static,
{
    fn definition(&self) -> &ToolDefinition {
        Self::definition(self)
    }

    fn requires_approval(&self, raw: &serde_json::Value, ctx: &ExecutionContext) -> bool {
        self.requires_approval_raw(raw, ctx)
    }

    async fn execute(
        &self,
        raw: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> ToolResult<serde_json::Value> {
        Self::execute(self, raw, ctx).await.into_json()
    }
}

/// Registry of tools by unique name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn DynTool>>>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Names are unique; a second registration is rejected.
    pub fn register(&self, tool: impl DynTool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    /// Registers a shared tool.
    pub fn register_arc(&self, tool: Arc<dyn DynTool>) -> Result<(), RegistryError> {
        let name = tool.definition().name.clone();
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        debug!(tool = %name, "registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Gets a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn DynTool>> {
        self.tools.read().get(name).cloned()
    }

    /// Checks whether a tool is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Lists registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Lists all definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|t| t.definition().clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Whether a call needs approval. Unknown tools always do.
    #[must_use]
    pub fn requires_approval(
        &self,
        name: &str,
        raw: &serde_json::Value,
        ctx: &ExecutionContext,
    ) -> bool {
        self.get(name).map_or(true, |tool| tool.requires_approval(raw, ctx))
    }

    /// Executes a tool by name. Unknown names yield `NOT_FOUND` and still
    /// reach the context's error hook.
    pub async fn execute(
        &self,
        name: &str,
        raw: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> ToolResult<serde_json::Value> {
        let Some(tool) = self.get(name) else {
            let info = ToolErrorInfo::not_found(format!("Unknown tool: {name}"));
            let call = HookContext::new(name, raw, ctx);
            guard_hook("on_error", &call, ctx.hooks().on_error(&call, &info)).await;
            return ToolResult::failure(info);
        };
        tool.execute(raw, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
