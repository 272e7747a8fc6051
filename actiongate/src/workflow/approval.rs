//! The approval workflow: runs an approved action to completion.
//!
//! Four steps, each reported to the event sink and retried on transient
//! store failures:
//!
//! 1. `lookup-action`
//! 2. `execute-tool` (claim `approved → executing`, load context, run tools)
//! 3. `update-action-status`
//! 4. `update-approval-request`
//!
//! Redelivered events are safe. An action another worker holds is skipped
//! until its claim lease expires, after which it is re-run under the same
//! approval id; a finished action only has its approval request mirror
//! re-applied.

use super::{with_retry, ActionApproved, RetryConfig};
use crate::actions::{
    Action, ActionStatus, ActionStore, ApprovalStatus, ApprovalUpdate, StatusUpdate,
    PENDING_ACTION_TYPE,
};
use crate::audit::ToolHooks;
use crate::config::ExecutionConfig;
use crate::context::ExecutionContext;
use crate::errors::{StoreError, ToolErrorInfo, WorkflowError};
use crate::events::{Event, EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::tools::{ToolRegistry, ToolResult};
use crate::utils::{new_id, Clock, SystemClock, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Step name: load the action.
pub const STEP_LOOKUP_ACTION: &str = "lookup-action";
/// Step name: claim and execute.
pub const STEP_EXECUTE_TOOL: &str = "execute-tool";
/// Step name: record the outcome on the action.
pub const STEP_UPDATE_ACTION_STATUS: &str = "update-action-status";
/// Step name: mirror the outcome on the approval request.
pub const STEP_UPDATE_APPROVAL_REQUEST: &str = "update-approval-request";

/// Builds the execution context for an approved action.
#[async_trait]
pub trait ContextLoader: Send + Sync {
    /// Loads user, purchases and app configuration for the action.
    async fn load(&self, action: &Action) -> Result<ExecutionContext, WorkflowError>;
}

/// Why a delivery did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The action is executing elsewhere under a live claim.
    ClaimHeld,
    /// Another worker won the claim race or took over the claim.
    ClaimLost,
    /// The action and its approval request are already final.
    AlreadyCompleted,
}

/// Result of handling one approval event.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// The action ran and both records were updated.
    Completed {
        /// The action ID.
        action_id: String,
        /// The final action status.
        status: ActionStatus,
        /// What the tools returned.
        result: ToolResult<serde_json::Value>,
    },
    /// A finished action had its approval request mirror repaired.
    Resumed {
        /// The action ID.
        action_id: String,
        /// The final action status.
        status: ActionStatus,
    },
    /// Nothing to do.
    Skipped {
        /// The action ID.
        action_id: String,
        /// Why.
        reason: SkipReason,
    },
}

impl WorkflowOutcome {
    /// The final action status, when this delivery ran or repaired it.
    #[must_use]
    pub const fn status(&self) -> Option<ActionStatus> {
        match self {
            Self::Completed { status, .. } | Self::Resumed { status, .. } => Some(*status),
            Self::Skipped { .. } => None,
        }
    }
}

/// Drives approved actions through execution and persistence.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ActionStore>,
    loader: Arc<dyn ContextLoader>,
    events: Arc<dyn EventSink>,
    hooks: Option<Arc<dyn ToolHooks>>,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
    claim_lease: chrono::Duration,
}

impl ApprovalWorkflow {
    /// Creates a workflow with no event sink and default retries.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ActionStore>,
        loader: Arc<dyn ContextLoader>,
    ) -> Self {
        Self {
            registry,
            store,
            loader,
            events: Arc::new(NoOpEventSink),
            hooks: None,
            retry: RetryConfig::default(),
            clock: Arc::new(SystemClock),
            claim_lease: ExecutionConfig::default().claim_lease(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Overrides the audit hooks on every loaded context.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ToolHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Sets the step retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Judges claim leases with this clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how long an execution claim stays live.
    #[must_use]
    pub const fn with_claim_lease(mut self, lease: chrono::Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    /// Runs [`verify_completion`] with this workflow's clock and lease.
    pub async fn verify(&self, action_id: &str) -> Result<(), WorkflowError> {
        verify_completion(self.store.as_ref(), action_id, self.stale_before()).await
    }

    fn stale_before(&self) -> Timestamp {
        self.clock.now() - self.claim_lease
    }

    /// Handles one approval event.
    pub async fn handle(&self, event: &ActionApproved) -> Result<WorkflowOutcome, WorkflowError> {
        let action_id = event.action_id.as_str();
        info!(action_id, approved_by = %event.approved_by, "handling approved action");

        let action = self
            .run_step(STEP_LOOKUP_ACTION, action_id, self.lookup(action_id))
            .await?;

        match action.status {
            ActionStatus::Approved => {}
            ActionStatus::Executing if action.claim_is_stale(self.stale_before()) => {
                warn!(action_id, claimed_at = ?action.claimed_at, "claim lease expired, re-running action");
            }
            ActionStatus::Executing => {
                debug!(action_id, "action already claimed, skipping");
                return Ok(WorkflowOutcome::Skipped {
                    action_id: action_id.to_string(),
                    reason: SkipReason::ClaimHeld,
                });
            }
            ActionStatus::Executed | ActionStatus::Failed => {
                return self.resume(&action, event).await;
            }
            status @ (ActionStatus::Proposed | ActionStatus::Rejected) => {
                return Err(WorkflowError::UnexpectedStatus {
                    action_id: action_id.to_string(),
                    status,
                    expected: ActionStatus::Approved,
                });
            }
        }

        let claim_lost = || WorkflowOutcome::Skipped {
            action_id: action_id.to_string(),
            reason: SkipReason::ClaimLost,
        };

        let Some((token, result)) = self
            .run_step(STEP_EXECUTE_TOOL, action_id, self.execute_tool(&action))
            .await?
        else {
            return Ok(claim_lost());
        };

        let update = match &result {
            ToolResult::Success { data } => StatusUpdate::executed(data.clone()),
            ToolResult::Failure { error } => StatusUpdate::failed(error.clone()),
        };
        let Some(updated) = self
            .run_step(
                STEP_UPDATE_ACTION_STATUS,
                action_id,
                self.record_outcome(action_id, &token, update),
            )
            .await?
        else {
            warn!(action_id, claim = %token, "claim taken over before the outcome was recorded");
            return Ok(claim_lost());
        };

        self.run_step(
            STEP_UPDATE_APPROVAL_REQUEST,
            action_id,
            self.mirror_approval(action_id, updated.status, event),
        )
        .await?;

        info!(action_id, status = %updated.status, "action completed");
        Ok(WorkflowOutcome::Completed {
            action_id: action_id.to_string(),
            status: updated.status,
            result,
        })
    }

    /// Consumes approval events until the channel closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ActionApproved>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match self.handle(&event).await {
                    Ok(outcome) => {
                        debug!(action_id = %event.action_id, ?outcome, "approval handled");
                    }
                    Err(err) => error!(
                        action_id = %event.action_id,
                        code = %err.code(),
                        error = %err,
                        "approval workflow failed"
                    ),
                }
            }
            debug!("approval listener stopped");
        })
    }

    async fn resume(
        &self,
        action: &Action,
        event: &ActionApproved,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let repaired = self
            .run_step(
                STEP_UPDATE_APPROVAL_REQUEST,
                &action.id,
                self.mirror_approval(&action.id, action.status, event),
            )
            .await?;

        if repaired {
            info!(action_id = %action.id, status = %action.status, "repaired approval request");
            Ok(WorkflowOutcome::Resumed {
                action_id: action.id.clone(),
                status: action.status,
            })
        } else {
            Ok(WorkflowOutcome::Skipped {
                action_id: action.id.clone(),
                reason: SkipReason::AlreadyCompleted,
            })
        }
    }

    async fn lookup(&self, action_id: &str) -> Result<Action, WorkflowError> {
        let store = self.store.as_ref();
        with_retry(&self.retry, STEP_LOOKUP_ACTION, WorkflowError::is_retryable, move || {
            fetch_action(store, action_id)
        })
        .await
    }

    /// Claims and runs the action, returning the claim token with the
    /// result. `None` means another worker holds the claim.
    async fn execute_tool(
        &self,
        action: &Action,
    ) -> Result<Option<(String, ToolResult<serde_json::Value>)>, WorkflowError> {
        let token = new_id("clm");
        if !self.claim(action, &token).await? {
            debug!(action_id = %action.id, "lost claim race");
            return Ok(None);
        }
        debug!(action_id = %action.id, claim = %token, "claimed action");

        let result = self.run_calls(action).await;
        Ok(Some((token, result)))
    }

    /// Takes the claim for `token`: `approved → executing`, or a takeover of
    /// an expired claim. Returns `false` when another worker holds it.
    async fn claim(&self, action: &Action, token: &str) -> Result<bool, WorkflowError> {
        let store = &self.store;
        let action_id = action.id.as_str();
        let reclaiming = action.status == ActionStatus::Executing;
        let stale_before = self.stale_before();

        let claimed = with_retry(
            &self.retry,
            "claim",
            WorkflowError::is_retryable,
            move || async move {
                let claimed = if reclaiming {
                    store.reclaim(action_id, token, stale_before).await
                } else {
                    store
                        .update_status(action_id, ActionStatus::Approved, StatusUpdate::claim(token))
                        .await
                };
                claimed.map_err(WorkflowError::from)
            },
        )
        .await;

        match claimed {
            Ok(_) => Ok(true),
            // A retried claim whose first write landed finds its own token.
            Err(WorkflowError::Store(StoreError::StatusConflict {
                actual: ActionStatus::Executing,
                ..
            })) => {
                let current = fetch_action(store.as_ref(), action_id).await?;
                Ok(current.claimed_by.as_deref() == Some(token))
            }
            Err(WorkflowError::Store(
                StoreError::StatusConflict { .. } | StoreError::ClaimHeld { .. },
            )) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Runs the action's tool calls in order, stopping at the first failure.
    async fn run_calls(&self, action: &Action) -> ToolResult<serde_json::Value> {
        let action_id = action.id.as_str();
        let calls = match action.tool_calls() {
            Ok(calls) => calls,
            Err(err) => {
                return ToolResult::failure(ToolErrorInfo::validation(
                    format!("Malformed tool calls: {err}"),
                    serde_json::json!([]),
                ));
            }
        };

        let loader = &self.loader;
        let loaded =
            with_retry(&self.retry, "load-context", WorkflowError::is_retryable, move || {
                loader.load(action)
            })
            .await;
        let ctx = match loaded {
            Ok(ctx) => self.prepare_context(ctx, action),
            Err(err) => {
                warn!(action_id, error = %err, "could not load execution context");
                return ToolResult::failure(ToolErrorInfo::new(err.code(), err.to_string()));
            }
        };

        let mut outputs = Vec::with_capacity(calls.len());
        for call in &calls {
            match self.registry.execute(&call.name, call.args.clone(), &ctx).await {
                ToolResult::Success { data } => outputs.push(data),
                failure @ ToolResult::Failure { .. } => {
                    if let Some(error) = failure.error_info() {
                        info!(action_id, tool = %call.name, code = %error.code, "tool failed");
                    }
                    return failure;
                }
            }
        }

        let data = if action.action_type == PENDING_ACTION_TYPE {
            serde_json::Value::Array(outputs)
        } else {
            outputs.pop().unwrap_or(serde_json::Value::Null)
        };
        ToolResult::success(data)
    }

    fn prepare_context(&self, ctx: ExecutionContext, action: &Action) -> ExecutionContext {
        let ctx = ctx
            .with_approval_id(&action.id)
            .with_store(Arc::clone(&self.store));
        match &self.hooks {
            Some(hooks) => ctx.with_hooks(Arc::clone(hooks)),
            None => ctx,
        }
    }

    /// Records the outcome under `token`. `None` means the claim was taken
    /// over and the new holder records its own outcome.
    async fn record_outcome(
        &self,
        action_id: &str,
        token: &str,
        update: StatusUpdate,
    ) -> Result<Option<Action>, WorkflowError> {
        let store = &self.store;
        let update = &update.with_claim(token);
        let recorded = with_retry(
            &self.retry,
            STEP_UPDATE_ACTION_STATUS,
            WorkflowError::is_retryable,
            move || async move {
                store
                    .update_status(action_id, ActionStatus::Executing, update.clone())
                    .await
                    .map_err(WorkflowError::from)
            },
        )
        .await;

        match recorded {
            Ok(action) => Ok(Some(action)),
            // A retried write whose first attempt landed.
            Err(WorkflowError::Store(StoreError::StatusConflict { actual, .. }))
                if actual.is_terminal() =>
            {
                let current = fetch_action(store.as_ref(), action_id).await?;
                Ok((current.claimed_by.as_deref() == Some(token)).then_some(current))
            }
            Err(WorkflowError::Store(StoreError::ClaimHeld { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Brings the approval request in line with `status`. Returns whether
    /// anything changed; actions without a request (auto-approved) are left
    /// alone.
    async fn mirror_approval(
        &self,
        action_id: &str,
        status: ActionStatus,
        event: &ActionApproved,
    ) -> Result<bool, WorkflowError> {
        let store = self.store.as_ref();
        let target = ApprovalStatus::mirroring(status);
        with_retry(
            &self.retry,
            STEP_UPDATE_APPROVAL_REQUEST,
            WorkflowError::is_retryable,
            move || mirror_once(store, action_id, target, event),
        )
        .await
    }

    async fn run_step<T, Fut>(
        &self,
        step: &'static str,
        action_id: &str,
        body: Fut,
    ) -> Result<T, WorkflowError>
    where
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        self.events
            .emit(Event::new(
                "workflow.step.started",
                action_id,
                serde_json::json!({ "step": step }),
            ))
            .await;

        let span = tracing::debug_span!("workflow_step", step, action_id);
        let timer = SpanTimer::start(step);
        let result = body.instrument(span).await;
        let duration_ms = timer.elapsed_ms();

        match &result {
            Ok(_) => {
                debug!(step = timer.name(), action_id, duration_ms, "step completed");
                self.events
                    .emit(Event::new(
                        "workflow.step.completed",
                        action_id,
                        serde_json::json!({ "step": step, "durationMs": duration_ms }),
                    ))
                    .await;
            }
            Err(err) => {
                error!(step, action_id, code = %err.code(), error = %err, "step failed");
                self.events
                    .emit(Event::new(
                        "workflow.step.failed",
                        action_id,
                        serde_json::json!({
                            "step": step,
                            "durationMs": duration_ms,
                            "code": err.code(),
                            "error": err.to_string(),
                        }),
                    ))
                    .await;
            }
        }
        result
    }
}

impl std::fmt::Debug for ApprovalWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalWorkflow")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("has_hooks", &self.hooks.is_some())
            .finish_non_exhaustive()
    }
}

async fn fetch_action(store: &dyn ActionStore, action_id: &str) -> Result<Action, WorkflowError> {
    store
        .get_action(action_id)
        .await?
        .ok_or_else(|| WorkflowError::ActionNotFound {
            action_id: action_id.to_string(),
        })
}

async fn mirror_once(
    store: &dyn ActionStore,
    action_id: &str,
    target: ApprovalStatus,
    event: &ActionApproved,
) -> Result<bool, WorkflowError> {
    let Some(request) = store.get_approval_request(action_id).await? else {
        return Ok(false);
    };
    if request.status == target {
        return Ok(false);
    }
    // A request left pending by an interrupted approval is approved first,
    // attributed to the event's approver.
    if request.status == ApprovalStatus::Pending
        && matches!(target, ApprovalStatus::Executed | ApprovalStatus::Failed)
    {
        let approve = ApprovalUpdate::to(ApprovalStatus::Approved)
            .decided_by(&event.approved_by, event.approved_at);
        store.update_approval_request(action_id, approve).await?;
    }
    store
        .update_approval_request(action_id, ApprovalUpdate::to(target))
        .await?;
    Ok(true)
}

/// Checks that an action's two records agree.
///
/// Returns `WorkflowError::Inconsistent` when the action is terminal but its
/// approval request says otherwise, and `WorkflowError::StaleClaim` when the
/// action is still executing under a claim taken at or before
/// `stale_before`. Actions in flight under a live claim, and actions without
/// a request, are consistent.
pub async fn verify_completion(
    store: &dyn ActionStore,
    action_id: &str,
    stale_before: Timestamp,
) -> Result<(), WorkflowError> {
    let action = fetch_action(store, action_id).await?;
    if action.claim_is_stale(stale_before) {
        return Err(WorkflowError::StaleClaim {
            action_id: action_id.to_string(),
            since: action.claimed_at.unwrap_or(action.updated_at),
        });
    }
    if !action.status.is_terminal() {
        return Ok(());
    }

    match store.get_approval_request(action_id).await? {
        Some(request) if !request.mirrors(action.status) => Err(WorkflowError::Inconsistent {
            action_id: action_id.to_string(),
            action_status: action.status,
            approval_status: request.status,
        }),
        _ => Ok(()),
    }
}
