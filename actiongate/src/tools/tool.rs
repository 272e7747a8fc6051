//! A registered tool: definition, compiled schema, typed handler.

use super::{handler_fn, ApprovalPredicate, ToolDefinition, ToolHandler, ToolResult};
use crate::audit::HookContext;
use crate::context::ExecutionContext;
use crate::errors::{HookError, RegistryError, ToolError, ToolErrorInfo};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// A tool with typed parameters `P` and output `O`.
///
/// Raw parameters are checked against the JSON Schema first, then
/// deserialized into `P`; the handler only ever sees valid input.
pub struct Tool<P, O> {
    definition: ToolDefinition,
    validator: jsonschema::Validator,
    handler: Arc<dyn ToolHandler<P, O>>,
    approval: Option<ApprovalPredicate<P>>,
    _output: PhantomData<fn() -> O>,
}

impl<P, O> Tool<P, O>
where
    P: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    /// Creates a tool, compiling its input schema.
    pub fn new(
        definition: ToolDefinition,
        handler: impl ToolHandler<P, O> + 'static,
    ) -> Result<Self, RegistryError> {
        let validator = jsonschema::validator_for(&definition.input_schema).map_err(|e| {
            RegistryError::InvalidSchema {
                name: definition.name.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            definition,
            validator,
            handler: Arc::new(handler),
            approval: None,
            _output: PhantomData,
        })
    }

    /// Creates a tool from an async closure.
    pub fn from_fn<F, Fut>(definition: ToolDefinition, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(P, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    {
        Self::new(definition, handler_fn(f))
    }

    /// Attaches an approval predicate.
    #[must_use]
    pub fn with_approval<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&P, &ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.approval = Some(Arc::new(predicate));
        self
    }

    /// Returns the definition.
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Validates and deserializes raw parameters.
    ///
    /// Every schema violation is listed in the error details.
    pub fn parse(&self, raw: &serde_json::Value) -> Result<P, ToolErrorInfo> {
        let violations: Vec<serde_json::Value> = self
            .validator
            .iter_errors(raw)
            .map(|e| {
                serde_json::json!({
                    "path": e.instance_path().to_string(),
                    "message": e.to_string(),
                })
            })
            .collect();

        if !violations.is_empty() {
            return Err(ToolErrorInfo::validation(
                format!("Invalid parameters for {}", self.definition.name),
                serde_json::Value::Array(violations),
            ));
        }

        serde_json::from_value(raw.clone()).map_err(|e| {
            ToolErrorInfo::validation(
                format!("Invalid parameters for {}", self.definition.name),
                serde_json::json!([{ "path": "", "message": e.to_string() }]),
            )
        })
    }

    /// Whether typed parameters need approval. Tools without a predicate
    /// never do.
    #[must_use]
    pub fn requires_approval(&self, params: &P, ctx: &ExecutionContext) -> bool {
        self.approval.as_ref().is_some_and(|predicate| predicate(params, ctx))
    }

    /// Whether raw parameters need approval; input that does not validate
    /// always does.
    #[must_use]
    pub fn requires_approval_raw(&self, raw: &serde_json::Value, ctx: &ExecutionContext) -> bool {
        self.parse(raw)
            .map_or(true, |params| self.requires_approval(&params, ctx))
    }

    /// Validates, runs the handler and fires the context's hooks.
    ///
    /// Never fails: every outcome is folded into the returned result.
    #[tracing::instrument(level = "debug", skip_all, fields(tool = %self.definition.name, trace_id = %ctx.trace_id()))]
    pub async fn execute(&self, raw: serde_json::Value, ctx: &ExecutionContext) -> ToolResult<O> {
        let hooks = ctx.hooks();
        let call = HookContext::new(&self.definition.name, raw.clone(), ctx);

        let params = match self.parse(&raw) {
            Ok(params) => params,
            Err(info) => {
                debug!(error = %info, "rejected invalid parameters");
                guard_hook("on_error", &call, hooks.on_error(&call, &info)).await;
                return ToolResult::failure(info);
            }
        };

        guard_hook("before_execute", &call, hooks.before_execute(&call)).await;

        let outcome = AssertUnwindSafe(self.handler.call(params, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ToolError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok(data) => {
                let snapshot = serde_json::to_value(&data).unwrap_or(serde_json::Value::Null);
                guard_hook("after_execute", &call, hooks.after_execute(&call, &snapshot)).await;
                ToolResult::success(data)
            }
            Err(err) => {
                let info = err.to_info();
                debug!(code = %info.code, error = %info.message, "tool failed");
                guard_hook("on_error", &call, hooks.on_error(&call, &info)).await;
                ToolResult::failure(info)
            }
        }
    }
}

impl<P, O> std::fmt::Debug for Tool<P, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .field("gated", &self.approval.is_some())
            .finish_non_exhaustive()
    }
}

/// Awaits a hook, logging and swallowing any error or panic.
pub(crate) async fn guard_hook<F>(phase: &'static str, call: &HookContext, hook: F)
where
    F: Future<Output = Result<(), HookError>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            hook = phase,
            tool = %call.tool_name,
            trace_id = %call.trace_id,
            error = %err,
            "audit hook failed"
        ),
        Err(payload) => warn!(
            hook = phase,
            tool = %call.tool_name,
            trace_id = %call.trace_id,
            panic = %panic_message(payload.as_ref()),
            "audit hook panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
