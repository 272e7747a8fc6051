//! Proposal lifecycle: propose, approve, reject.

use super::{Action, ActionStatus, ActionStore, ApprovalRequest, ApprovalStatus, ApprovalUpdate};
use super::{StatusUpdate, ToolCall};
use crate::context::ExecutionContext;
use crate::errors::{StoreError, WorkflowError};
use crate::tools::ToolRegistry;
use crate::utils::{Clock, SystemClock};
use crate::workflow::{ActionApproved, ApprovalWorkflow, WorkflowOutcome};
use std::sync::Arc;
use tracing::info;

/// Who approves actions the gate lets through.
pub const AUTO_APPROVER: &str = "system:auto-approve";

/// What happened to a proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// Waiting for a human.
    PendingApproval {
        /// The proposed action.
        action: Action,
        /// Its approval request.
        request: ApprovalRequest,
    },
    /// The gate allowed it and it already ran.
    AutoApproved {
        /// The action as stored after the run.
        action: Action,
        /// The workflow outcome.
        outcome: WorkflowOutcome,
    },
}

/// Entry point for proposing actions and recording human decisions.
pub struct ActionService {
    registry: Arc<ToolRegistry>,
    workflow: Arc<ApprovalWorkflow>,
    clock: Arc<dyn Clock>,
}

impl ActionService {
    /// Creates a service sharing the workflow's store.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, workflow: Arc<ApprovalWorkflow>) -> Self {
        Self {
            registry,
            workflow,
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps decisions with this clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn store(&self) -> &dyn ActionStore {
        self.workflow.store().as_ref()
    }

    /// Proposes a single tool call.
    pub async fn propose(
        &self,
        tool_name: &str,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<Proposal, WorkflowError> {
        if !self.registry.contains(tool_name) {
            return Err(WorkflowError::UnknownTool {
                name: tool_name.to_string(),
            });
        }
        let gated = self.registry.requires_approval(tool_name, &args, ctx);
        let action = Action::new(
            tool_name,
            args,
            ctx.conversation_id(),
            &ctx.app().id,
            ctx.now(),
        );
        self.submit(action, gated).await
    }

    /// Proposes several tool calls as one `pending-action`. Approval is
    /// required if any call needs it.
    pub async fn propose_calls(
        &self,
        calls: &[ToolCall],
        ctx: &ExecutionContext,
    ) -> Result<Proposal, WorkflowError> {
        if let Some(unknown) = calls.iter().find(|c| !self.registry.contains(&c.name)) {
            return Err(WorkflowError::UnknownTool {
                name: unknown.name.clone(),
            });
        }
        let gated = calls
            .iter()
            .any(|c| self.registry.requires_approval(&c.name, &c.args, ctx));
        let action = Action::pending(calls, ctx.conversation_id(), &ctx.app().id, ctx.now());
        self.submit(action, gated).await
    }

    async fn submit(&self, action: Action, gated: bool) -> Result<Proposal, WorkflowError> {
        let now = self.clock.now();

        if gated {
            let request = ApprovalRequest::pending(&action.id, now);
            self.store().insert_action(action.clone()).await?;
            self.store().insert_approval_request(request.clone()).await?;
            info!(action_id = %action.id, kind = %action.action_type, "action awaiting approval");
            return Ok(Proposal::PendingApproval { action, request });
        }

        let action = action.with_status(ActionStatus::Approved);
        let action_id = action.id.clone();
        self.store().insert_action(action).await?;
        info!(action_id = %action_id, "action auto-approved");

        let outcome = self
            .workflow
            .handle(&ActionApproved::new(&action_id, AUTO_APPROVER, now))
            .await?;
        let action = self
            .store()
            .get_action(&action_id)
            .await?
            .ok_or(WorkflowError::ActionNotFound { action_id })?;
        Ok(Proposal::AutoApproved { action, outcome })
    }

    /// Approves a proposed action and returns the event to publish.
    pub async fn approve(
        &self,
        action_id: &str,
        approved_by: &str,
    ) -> Result<ActionApproved, WorkflowError> {
        let now = self.clock.now();
        self.transition(action_id, ActionStatus::Approved).await?;
        self.store()
            .update_approval_request(
                action_id,
                ApprovalUpdate::to(ApprovalStatus::Approved).decided_by(approved_by, now),
            )
            .await?;

        info!(action_id, approved_by, "action approved");
        Ok(ActionApproved::new(action_id, approved_by, now))
    }

    /// Rejects a proposed action.
    pub async fn reject(
        &self,
        action_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<Action, WorkflowError> {
        let now = self.clock.now();
        let action = self.transition(action_id, ActionStatus::Rejected).await?;
        self.store()
            .update_approval_request(
                action_id,
                ApprovalUpdate::to(ApprovalStatus::Rejected)
                    .decided_by(rejected_by, now)
                    .with_reason(reason),
            )
            .await?;

        info!(action_id, rejected_by, reason, "action rejected");
        Ok(action)
    }

    async fn transition(&self, action_id: &str, to: ActionStatus) -> Result<Action, WorkflowError> {
        self.store()
            .update_status(action_id, ActionStatus::Proposed, StatusUpdate::to(to))
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => WorkflowError::ActionNotFound {
                    action_id: action_id.to_string(),
                },
                StoreError::StatusConflict { actual, .. } => WorkflowError::UnexpectedStatus {
                    action_id: action_id.to_string(),
                    status: actual,
                    expected: ActionStatus::Proposed,
                },
                other => WorkflowError::Store(other),
            })
    }
}

impl std::fmt::Debug for ActionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::testing::{fixtures, StaticContextLoader};
    use crate::tools::{Tool, ToolDefinition};
    use crate::workflow::RetryConfig;
    use crate::actions::InMemoryActionStore;
    use pretty_assertions::assert_eq;

    fn service() -> (ActionService, Arc<InMemoryActionStore>) {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                Tool::from_fn(
                    ToolDefinition::new("note"),
                    |p: serde_json::Value, _ctx| async move { Ok(p) },
                )
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                Tool::from_fn(
                    ToolDefinition::new("wipe"),
                    |_p: serde_json::Value, _ctx| async move { Ok(true) },
                )
                .unwrap()
                .with_approval(|_p, _ctx| true),
            )
            .unwrap();

        let store = Arc::new(InMemoryActionStore::new());
        let workflow = ApprovalWorkflow::new(
            registry.clone(),
            store.clone(),
            Arc::new(StaticContextLoader::new(fixtures::context())),
        )
        .with_retry(RetryConfig::disabled());
        let service = ActionService::new(registry, Arc::new(workflow))
            .with_clock(Arc::new(fixtures::clock()));
        (service, store)
    }

    #[tokio::test]
    async fn test_ungated_proposal_runs_immediately() {
        let (service, store) = service();
        let proposal = service
            .propose("note", serde_json::json!({"text": "hi"}), &fixtures::context())
            .await
            .unwrap();

        let Proposal::AutoApproved { action, outcome } = proposal else {
            panic!("expected auto-approval");
        };
        assert_eq!(action.status, ActionStatus::Executed);
        assert_eq!(outcome.status(), Some(ActionStatus::Executed));
        assert!(store.get_approval_request(&action.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gated_proposal_waits() {
        let (service, store) = service();
        let proposal = service
            .propose("wipe", serde_json::json!({}), &fixtures::context())
            .await
            .unwrap();

        let Proposal::PendingApproval { action, request } = proposal else {
            panic!("expected pending approval");
        };
        assert_eq!(action.status, ActionStatus::Proposed);
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_approve_then_reapprove() {
        let (service, store) = service();
        let Proposal::PendingApproval { action, .. } = service
            .propose("wipe", serde_json::json!({}), &fixtures::context())
            .await
            .unwrap()
        else {
            panic!("expected pending approval");
        };

        let event = service.approve(&action.id, "ops@example.com").await.unwrap();
        assert_eq!(event.action_id, action.id);
        let request = store.get_approval_request(&action.id).await.unwrap().unwrap();
        assert_eq!(request.approved_by.as_deref(), Some("ops@example.com"));

        let again = service.approve(&action.id, "ops@example.com").await.unwrap_err();
        assert!(matches!(
            again,
            WorkflowError::UnexpectedStatus {
                status: ActionStatus::Approved,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reject() {
        let (service, store) = service();
        let Proposal::PendingApproval { action, .. } = service
            .propose("wipe", serde_json::json!({}), &fixtures::context())
            .await
            .unwrap()
        else {
            panic!("expected pending approval");
        };

        let rejected = service
            .reject(&action.id, "ops@example.com", "duplicate request")
            .await
            .unwrap();
        assert_eq!(rejected.status, ActionStatus::Rejected);

        let request = store.get_approval_request(&action.id).await.unwrap().unwrap();
        assert_eq!(request.status, ApprovalStatus::Rejected);
        assert_eq!(request.reason.as_deref(), Some("duplicate request"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_action() {
        let (service, _) = service();

        let err = service
            .propose("nope", serde_json::json!({}), &fixtures::context())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = service.approve("missing", "ops").await.unwrap_err();
        assert!(matches!(err, WorkflowError::ActionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_batch_gated_if_any_call_is() {
        let (service, _) = service();
        let calls = vec![
            ToolCall::new("note", serde_json::json!({})),
            ToolCall::new("wipe", serde_json::json!({})),
        ];

        let proposal = service.propose_calls(&calls, &fixtures::context()).await.unwrap();
        assert!(matches!(proposal, Proposal::PendingApproval { .. }));
    }
}
