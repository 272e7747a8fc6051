//! End-to-end tests: approval event → refund → persisted outcome → audit.

use super::*;
use crate::actions::{
    Action, ActionService, ActionStatus, ActionStore, ApprovalRequest, ApprovalStatus,
    ApprovalUpdate, InMemoryActionStore, Proposal, StatusUpdate, StoreOperation,
};
use crate::audit::{AuditTrail, InMemoryAuditSink};
use crate::catalog::{register_support_tools, PROCESS_REFUND};
use crate::errors::{ErrorCode, StoreError, WorkflowError};
use crate::events::CollectingEventSink;
use crate::payments::{CapabilityReply, Decline, DeclineKind, RefundExecutor};
use crate::testing::{
    assert_action_settled, fixtures, FakePaymentProcessor, RecordingIntegration,
    StaticContextLoader,
};
use crate::tools::{ToolRegistry, ToolResult};
use crate::utils::{FixedClock, Timestamp};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct Harness {
    workflow: Arc<ApprovalWorkflow>,
    registry: Arc<ToolRegistry>,
    store: Arc<InMemoryActionStore>,
    processor: Arc<FakePaymentProcessor>,
    integration: Arc<RecordingIntegration>,
    audit: Arc<InMemoryAuditSink>,
    events: Arc<CollectingEventSink>,
    loader: Arc<StaticContextLoader>,
    clock: Arc<FixedClock>,
}

fn harness() -> Harness {
    harness_with(RecordingIntegration::new())
}

fn harness_with(integration: RecordingIntegration) -> Harness {
    harness_from(
        FakePaymentProcessor::new()
            .with_charge(fixtures::RECENT_PURCHASE, 9_900)
            .with_charge(fixtures::OLD_PURCHASE, 9_900),
        integration,
    )
}

fn harness_from(processor: FakePaymentProcessor, integration: RecordingIntegration) -> Harness {
    let processor = Arc::new(processor);
    let integration = Arc::new(integration);
    let executor = Arc::new(RefundExecutor::new(processor.clone(), integration.clone()));
    let registry = Arc::new(ToolRegistry::new());
    register_support_tools(&registry, executor, integration.clone()).unwrap();

    let clock = Arc::new(fixtures::clock());
    let store = Arc::new(InMemoryActionStore::new().with_clock(clock.clone()));
    let audit = Arc::new(InMemoryAuditSink::new());
    let events = Arc::new(CollectingEventSink::new());
    let loader = Arc::new(StaticContextLoader::new(fixtures::context()));

    let mut h = Harness {
        workflow: Arc::new(ApprovalWorkflow::new(
            registry.clone(),
            store.clone(),
            loader.clone(),
        )),
        registry,
        store,
        processor,
        integration,
        audit,
        events,
        loader,
        clock,
    };
    h.workflow = Arc::new(h.workflow_over(h.store.clone()));
    h
}

impl Harness {
    /// Builds a workflow sharing this harness's tools, sinks and clock.
    fn workflow_over(&self, store: Arc<dyn ActionStore>) -> ApprovalWorkflow {
        ApprovalWorkflow::new(self.registry.clone(), store, self.loader.clone())
            .with_events(self.events.clone())
            .with_hooks(Arc::new(AuditTrail::new(self.audit.clone())))
            .with_clock(self.clock.clone())
            .with_claim_lease(chrono::Duration::minutes(5))
            .with_retry(
                RetryConfig::new()
                    .with_base_delay_ms(1)
                    .with_jitter(JitterStrategy::None),
            )
    }

    /// Stores an approved refund action with an approved request.
    async fn seed(&self, action_id: &str, purchase_id: &str) {
        self.store
            .insert_action(fixtures::approved_refund_action(action_id, purchase_id))
            .await
            .unwrap();
        self.store
            .insert_approval_request(ApprovalRequest::pending(action_id, fixtures::now()))
            .await
            .unwrap();
        self.store
            .update_approval_request(
                action_id,
                ApprovalUpdate::to(ApprovalStatus::Approved)
                    .decided_by("ops@example.com", fixtures::now()),
            )
            .await
            .unwrap();
    }
}

fn approved(action_id: &str) -> ActionApproved {
    ActionApproved::new(action_id, "ops@example.com", fixtures::now())
}

/// Wraps the in-memory store with faults the workflow cannot see coming.
struct FaultyStore {
    inner: Arc<InMemoryActionStore>,
    /// Fails every outcome write (`executing → *`) before it applies.
    fail_outcomes: AtomicBool,
    /// Applies this many claims but reports them as failed.
    lose_claim_replies: AtomicUsize,
    /// Lets another worker take over the claim just before the outcome write.
    steal_claim: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Arc<InMemoryActionStore>) -> Self {
        Self {
            inner,
            fail_outcomes: AtomicBool::new(false),
            lose_claim_replies: AtomicUsize::new(0),
            steal_claim: AtomicBool::new(false),
        }
    }

    fn take_lost_reply(&self) -> bool {
        self.lose_claim_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ActionStore for FaultyStore {
    async fn insert_action(&self, action: Action) -> Result<(), StoreError> {
        self.inner.insert_action(action).await
    }

    async fn get_action(&self, id: &str) -> Result<Option<Action>, StoreError> {
        self.inner.get_action(id).await
    }

    async fn update_status(
        &self,
        id: &str,
        expected: ActionStatus,
        update: StatusUpdate,
    ) -> Result<Action, StoreError> {
        if expected == ActionStatus::Executing {
            if self.fail_outcomes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            if self.steal_claim.swap(false, Ordering::SeqCst) {
                let far_future = fixtures::now() + chrono::Duration::days(1);
                self.inner.reclaim(id, "clm-other", far_future).await?;
            }
        }
        if update.status == ActionStatus::Executing && self.take_lost_reply() {
            self.inner.update_status(id, expected, update).await?;
            return Err(StoreError::Unavailable("reply lost".into()));
        }
        self.inner.update_status(id, expected, update).await
    }

    async fn reclaim(
        &self,
        id: &str,
        token: &str,
        stale_before: Timestamp,
    ) -> Result<Action, StoreError> {
        self.inner.reclaim(id, token, stale_before).await
    }

    async fn insert_approval_request(&self, request: ApprovalRequest) -> Result<(), StoreError> {
        self.inner.insert_approval_request(request).await
    }

    async fn get_approval_request(
        &self,
        action_id: &str,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        self.inner.get_approval_request(action_id).await
    }

    async fn update_approval_request(
        &self,
        action_id: &str,
        update: ApprovalUpdate,
    ) -> Result<ApprovalRequest, StoreError> {
        self.inner.update_approval_request(action_id, update).await
    }
}

#[tokio::test]
async fn test_approved_refund_runs_end_to_end() {
    let h = harness();
    h.seed("action-123", "order-456").await;

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;

    let action = h.store.get_action("action-123").await.unwrap().unwrap();
    let result = action.result.unwrap();
    assert_eq!(result[0]["idempotencyKey"], "refund:order-456:action-123");
    assert_eq!(result[0]["amountRefundedCents"], 9_900);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tool_name, PROCESS_REFUND);
    assert!(records[0].is_success());
    assert_eq!(records[0].trace_id, fixtures::TRACE_ID);
    assert_eq!(records[0].app_id, fixtures::APP_ID);

    assert_eq!(h.processor.refunds_created(), 1);
    assert_eq!(h.integration.revocations().len(), 1);
    assert_eq!(
        h.events.steps("workflow.step.completed"),
        vec![
            STEP_LOOKUP_ACTION,
            STEP_EXECUTE_TOOL,
            STEP_UPDATE_ACTION_STATUS,
            STEP_UPDATE_APPROVAL_REQUEST
        ]
    );
    h.workflow.verify("action-123").await.unwrap();
}

#[tokio::test]
async fn test_missing_action_aborts_before_execute_tool() {
    let h = harness();

    let err = h.workflow.handle(&approved("action-404")).await.unwrap_err();

    assert!(matches!(err, WorkflowError::ActionNotFound { .. }));
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(h.events.steps("workflow.step.started"), vec![STEP_LOOKUP_ACTION]);
    assert_eq!(h.events.steps("workflow.step.failed"), vec![STEP_LOOKUP_ACTION]);
    assert_eq!(h.loader.loads(), 0);
    assert!(h.processor.submitted_keys().is_empty());
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn test_redelivery_does_not_reexecute() {
    let h = harness();
    h.seed("action-123", "order-456").await;

    h.workflow.handle(&approved("action-123")).await.unwrap();
    let again = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(
        again,
        WorkflowOutcome::Skipped {
            action_id: "action-123".into(),
            reason: SkipReason::AlreadyCompleted,
        }
    );
    assert_eq!(h.processor.submitted_keys().len(), 1);
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn test_action_still_executing_is_skipped() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    h.store
        .update_status(
            "action-123",
            ActionStatus::Approved,
            StatusUpdate::to(ActionStatus::Executing),
        )
        .await
        .unwrap();

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(
        outcome,
        WorkflowOutcome::Skipped {
            action_id: "action-123".into(),
            reason: SkipReason::ClaimHeld,
        }
    );
    assert!(h.processor.submitted_keys().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_execute_once() {
    let h = harness();
    h.seed("action-123", "order-456").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let workflow = Arc::clone(&h.workflow);
            tokio::spawn(async move { workflow.handle(&approved("action-123")).await })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        if let WorkflowOutcome::Completed { .. } = handle.await.unwrap().unwrap() {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(h.processor.refunds_created(), 1);
    assert_eq!(h.processor.submitted_keys().len(), 1);
    assert_eq!(h.audit.len(), 1);
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;
}

#[tokio::test]
async fn test_declined_refund_fails_action_without_retry() {
    let h = harness();
    h.processor
        .decline_with(Decline::new(DeclineKind::Authorization, "Invalid API key provided"));
    h.seed("action-123", "order-456").await;

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Failed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Failed).await;
    let action = h.store.get_action("action-123").await.unwrap().unwrap();
    let error = action.error.unwrap();
    assert_eq!(error.code, ErrorCode::AuthorizationError);
    assert_eq!(error.message, "Invalid API key provided");
    assert_eq!(h.processor.submitted_keys().len(), 1);
    assert_eq!(h.audit.records()[0].error_code(), Some(ErrorCode::AuthorizationError));
}

#[tokio::test]
async fn test_failed_revocation_is_flagged_for_reconciliation() {
    let h = harness_with(
        RecordingIntegration::new()
            .with_revoke_reply(CapabilityReply::unavailable("connection reset")),
    );
    h.seed("action-123", "order-456").await;

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Failed));
    let action = h.store.get_action("action-123").await.unwrap().unwrap();
    assert_eq!(action.error.unwrap().code, ErrorCode::PartialCompletion);
    assert_eq!(h.processor.refunds_created(), 1);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].requires_reconciliation());
}

#[tokio::test]
async fn test_partial_persistence_is_detected_and_repaired() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    h.store.fail_next(StoreOperation::UpdateApprovalRequest, 3);

    let err = h.workflow.handle(&approved("action-123")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Store(StoreError::Unavailable(_))));
    assert_eq!(
        h.events.steps("workflow.step.failed"),
        vec![STEP_UPDATE_APPROVAL_REQUEST]
    );

    let inconsistency = h.workflow.verify("action-123").await.unwrap_err();
    assert!(matches!(
        inconsistency,
        WorkflowError::Inconsistent {
            action_status: ActionStatus::Executed,
            approval_status: ApprovalStatus::Approved,
            ..
        }
    ));

    let resumed = h.workflow.handle(&approved("action-123")).await.unwrap();
    assert_eq!(
        resumed,
        WorkflowOutcome::Resumed {
            action_id: "action-123".into(),
            status: ActionStatus::Executed,
        }
    );
    verify_completion(h.store.as_ref(), "action-123", fixtures::now())
        .await
        .unwrap();
    assert_eq!(h.processor.submitted_keys().len(), 1);
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    h.store.fail_next(StoreOperation::GetAction, 2);

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert!(h.events.steps("workflow.step.failed").is_empty());
}

#[tokio::test]
async fn test_context_failure_after_claim_fails_action() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    h.loader.fail_next(1, false);

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Failed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Failed).await;
    assert!(h.processor.submitted_keys().is_empty());
}

#[tokio::test]
async fn test_unapproved_action_is_refused() {
    let h = harness();
    h.store
        .insert_action(
            fixtures::approved_refund_action("action-123", "order-456")
                .with_status(ActionStatus::Proposed),
        )
        .await
        .unwrap();

    let err = h.workflow.handle(&approved("action-123")).await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::UnexpectedStatus {
            status: ActionStatus::Proposed,
            ..
        }
    ));
    assert_eq!(h.events.steps("workflow.step.started"), vec![STEP_LOOKUP_ACTION]);
}

#[tokio::test]
async fn test_listener_tolerates_duplicate_delivery() {
    let h = harness();
    h.seed("action-123", "order-456").await;

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let listener = Arc::clone(&h.workflow).spawn_listener(rx);
    tx.send(approved("action-123")).await.unwrap();
    tx.send(approved("action-123")).await.unwrap();
    tx.send(approved("action-404")).await.unwrap();
    drop(tx);
    listener.await.unwrap();

    assert_eq!(h.processor.refunds_created(), 1);
    assert_eq!(h.audit.len(), 1);
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;
}

#[tokio::test]
async fn test_service_gates_old_purchases() {
    let h = harness();
    let service = ActionService::new(h.registry.clone(), h.workflow.clone())
        .with_clock(Arc::new(fixtures::clock()));
    let ctx = fixtures::context();

    let recent = service
        .propose(
            PROCESS_REFUND,
            serde_json::json!({"purchaseId": fixtures::RECENT_PURCHASE}),
            &ctx,
        )
        .await
        .unwrap();
    let Proposal::AutoApproved { action, outcome } = recent else {
        panic!("recent purchase should be auto-approved");
    };
    assert_eq!(action.status, ActionStatus::Executed);
    assert!(matches!(
        outcome,
        WorkflowOutcome::Completed {
            result: ToolResult::Success { .. },
            ..
        }
    ));

    let old = service
        .propose(
            PROCESS_REFUND,
            serde_json::json!({"purchaseId": fixtures::OLD_PURCHASE}),
            &ctx,
        )
        .await
        .unwrap();
    let Proposal::PendingApproval { action, .. } = old else {
        panic!("old purchase should wait for approval");
    };
    assert_eq!(h.processor.refunds_created(), 1);

    let event = service.approve(&action.id, "ops@example.com").await.unwrap();
    let outcome = h.workflow.handle(&event).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert_action_settled(h.store.as_ref(), &action.id, ActionStatus::Executed).await;
    assert_eq!(h.processor.refunds_created(), 2);
    assert_eq!(
        h.processor.submitted_keys()[1],
        format!("refund:{}:{}", fixtures::OLD_PURCHASE, action.id)
    );
}

#[tokio::test]
async fn test_unrecorded_outcome_is_rerun_after_claim_lease() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    let store = Arc::new(FaultyStore::new(h.store.clone()));
    store.fail_outcomes.store(true, Ordering::SeqCst);
    let workflow = h.workflow_over(store.clone());

    let err = workflow.handle(&approved("action-123")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Store(StoreError::Unavailable(_))));
    assert_eq!(
        h.events.steps("workflow.step.failed"),
        vec![STEP_UPDATE_ACTION_STATUS]
    );
    let stuck = h.store.get_action("action-123").await.unwrap().unwrap();
    assert_eq!(stuck.status, ActionStatus::Executing);
    assert_eq!(h.processor.refunds_created(), 1);
    store.fail_outcomes.store(false, Ordering::SeqCst);

    // Inside the lease the claim is still live.
    workflow.verify("action-123").await.unwrap();
    let held = workflow.handle(&approved("action-123")).await.unwrap();
    assert_eq!(
        held,
        WorkflowOutcome::Skipped {
            action_id: "action-123".into(),
            reason: SkipReason::ClaimHeld,
        }
    );

    h.clock.advance(chrono::Duration::minutes(5));
    let stale = workflow.verify("action-123").await.unwrap_err();
    assert!(matches!(
        stale,
        WorkflowError::StaleClaim { ref action_id, since } if action_id == "action-123" && since == fixtures::now()
    ));
    assert_eq!(stale.code(), ErrorCode::PartialCompletion);

    let outcome = workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;
    workflow.verify("action-123").await.unwrap();
    assert_eq!(h.processor.refunds_created(), 1);
    assert_eq!(
        h.processor.submitted_keys(),
        vec!["refund:order-456:action-123".to_string(); 2]
    );
}

#[tokio::test]
async fn test_claim_with_lost_reply_is_recognised() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    let store = Arc::new(FaultyStore::new(h.store.clone()));
    store.lose_claim_replies.store(1, Ordering::SeqCst);
    let workflow = h.workflow_over(store);

    let outcome = workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;
    assert_eq!(h.processor.refunds_created(), 1);
}

#[tokio::test]
async fn test_superseded_claim_leaves_outcome_to_new_holder() {
    let h = harness();
    h.seed("action-123", "order-456").await;
    let store = Arc::new(FaultyStore::new(h.store.clone()));
    store.steal_claim.store(true, Ordering::SeqCst);
    let workflow = h.workflow_over(store);

    let outcome = workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(
        outcome,
        WorkflowOutcome::Skipped {
            action_id: "action-123".into(),
            reason: SkipReason::ClaimLost,
        }
    );
    let action = h.store.get_action("action-123").await.unwrap().unwrap();
    assert_eq!(action.status, ActionStatus::Executing);
    assert_eq!(action.claimed_by.as_deref(), Some("clm-other"));
}

#[tokio::test]
async fn test_pending_request_records_event_approver() {
    let h = harness();
    h.store
        .insert_action(fixtures::approved_refund_action("action-123", "order-456"))
        .await
        .unwrap();
    h.store
        .insert_approval_request(ApprovalRequest::pending("action-123", fixtures::now()))
        .await
        .unwrap();
    let approved_at = fixtures::now() + chrono::Duration::minutes(3);
    let event = ActionApproved::new("action-123", "lead@example.com", approved_at);

    let outcome = h.workflow.handle(&event).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    let request = h
        .store
        .get_approval_request("action-123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, ApprovalStatus::Executed);
    assert_eq!(request.approved_by.as_deref(), Some("lead@example.com"));
    assert_eq!(request.approved_at, Some(approved_at));
}

#[tokio::test]
async fn test_charge_refunded_elsewhere_succeeds_without_new_refund() {
    let h = harness_from(
        FakePaymentProcessor::new().with_refunded_charge(fixtures::RECENT_PURCHASE, 9_900),
        RecordingIntegration::new(),
    );
    h.seed("action-123", fixtures::RECENT_PURCHASE).await;

    let outcome = h.workflow.handle(&approved("action-123")).await.unwrap();

    assert_eq!(outcome.status(), Some(ActionStatus::Executed));
    assert_action_settled(h.store.as_ref(), "action-123", ActionStatus::Executed).await;
    let action = h.store.get_action("action-123").await.unwrap().unwrap();
    let receipt = &action.result.unwrap()[0];
    assert_eq!(receipt["alreadyApplied"], true);
    assert_eq!(receipt["amountRefundedCents"], 9_900);
    assert_eq!(h.processor.refunds_created(), 0);
    assert_eq!(h.processor.submitted_keys().len(), 1);
    assert_eq!(h.integration.revocations().len(), 1);
}
