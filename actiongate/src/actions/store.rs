//! Durable storage for actions and approval requests.

use super::{Action, ActionStatus, ApprovalRequest, ApprovalUpdate, StatusUpdate};
use crate::errors::StoreError;
use crate::utils::{Clock, SystemClock, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage backend for actions and their approval requests.
///
/// `update_status` is a compare-and-set: it applies only when the stored
/// status equals `expected`, and is the sole way a worker claims an action.
/// A claim carries a token; an update made under a token applies only while
/// that token still holds the claim. `reclaim` hands an expired claim to a
/// new token.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Inserts a new action.
    async fn insert_action(&self, action: Action) -> Result<(), StoreError>;

    /// Gets an action by ID.
    async fn get_action(&self, id: &str) -> Result<Option<Action>, StoreError>;

    /// Atomically moves an action from `expected` to `update.status`.
    async fn update_status(
        &self,
        id: &str,
        expected: ActionStatus,
        update: StatusUpdate,
    ) -> Result<Action, StoreError>;

    /// Atomically takes over the claim of an executing action whose claim
    /// was taken at or before `stale_before`. Re-claiming with the token that
    /// already holds the claim succeeds without changes.
    async fn reclaim(
        &self,
        id: &str,
        token: &str,
        stale_before: Timestamp,
    ) -> Result<Action, StoreError>;

    /// Inserts the approval request of an action.
    async fn insert_approval_request(&self, request: ApprovalRequest) -> Result<(), StoreError>;

    /// Gets the approval request of an action.
    async fn get_approval_request(
        &self,
        action_id: &str,
    ) -> Result<Option<ApprovalRequest>, StoreError>;

    /// Updates the approval request of an action. Re-applying the current
    /// status is a no-op.
    async fn update_approval_request(
        &self,
        action_id: &str,
        update: ApprovalUpdate,
    ) -> Result<ApprovalRequest, StoreError>;
}

/// Store operations, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `insert_action`.
    InsertAction,
    /// `get_action`.
    GetAction,
    /// `update_status`.
    UpdateStatus,
    /// `reclaim`.
    Reclaim,
    /// `insert_approval_request`.
    InsertApprovalRequest,
    /// `get_approval_request`.
    GetApprovalRequest,
    /// `update_approval_request`.
    UpdateApprovalRequest,
}

#[derive(Debug, Default)]
struct Tables {
    actions: HashMap<String, Action>,
    approvals: HashMap<String, ApprovalRequest>,
    failures: HashMap<StoreOperation, usize>,
}

impl Tables {
    fn check(&mut self, op: StoreOperation) -> Result<(), StoreError> {
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!("injected failure in {op:?}")))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory store. Every operation runs under one lock, so the
/// compare-and-set in `update_status` is linearizable.
pub struct InMemoryActionStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryActionStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl InMemoryActionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps updates with this clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Makes the next `times` calls of `op` fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, op: StoreOperation, times: usize) {
        self.tables.lock().failures.insert(op, times);
    }

    /// Returns the number of stored actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().actions.len()
    }

    /// Returns true if no actions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.lock().actions.is_empty()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn insert_action(&self, action: Action) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::InsertAction)?;
        if tables.actions.contains_key(&action.id) {
            return Err(StoreError::Duplicate {
                kind: "action",
                id: action.id,
            });
        }
        tables.actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<Action>, StoreError> {
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::GetAction)?;
        Ok(tables.actions.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        expected: ActionStatus,
        update: StatusUpdate,
    ) -> Result<Action, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::UpdateStatus)?;

        let action = tables.actions.get_mut(id).ok_or_else(|| StoreError::NotFound {
            kind: "action",
            id: id.to_string(),
        })?;

        if action.status != expected {
            return Err(StoreError::StatusConflict {
                id: id.to_string(),
                expected,
                actual: action.status,
            });
        }
        if !expected.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                from: expected,
                to: update.status,
            });
        }
        if expected == ActionStatus::Executing
            && update.claimed_by.is_some()
            && action.claimed_by != update.claimed_by
        {
            return Err(StoreError::ClaimHeld {
                id: id.to_string(),
                claimed_by: action.claimed_by.clone(),
            });
        }

        if update.status == ActionStatus::Executing {
            action.claimed_by = update.claimed_by;
            action.claimed_at = Some(now);
        }
        action.status = update.status;
        if update.result.is_some() {
            action.result = update.result;
        }
        if update.error.is_some() {
            action.error = update.error;
        }
        action.updated_at = now;
        Ok(action.clone())
    }

    async fn reclaim(
        &self,
        id: &str,
        token: &str,
        stale_before: Timestamp,
    ) -> Result<Action, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::Reclaim)?;

        let action = tables.actions.get_mut(id).ok_or_else(|| StoreError::NotFound {
            kind: "action",
            id: id.to_string(),
        })?;

        if action.status != ActionStatus::Executing {
            return Err(StoreError::StatusConflict {
                id: id.to_string(),
                expected: ActionStatus::Executing,
                actual: action.status,
            });
        }
        if action.claimed_by.as_deref() == Some(token) {
            return Ok(action.clone());
        }
        if !action.claim_is_stale(stale_before) {
            return Err(StoreError::ClaimHeld {
                id: id.to_string(),
                claimed_by: action.claimed_by.clone(),
            });
        }

        action.claimed_by = Some(token.to_string());
        action.claimed_at = Some(now);
        action.updated_at = now;
        Ok(action.clone())
    }

    async fn insert_approval_request(&self, request: ApprovalRequest) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::InsertApprovalRequest)?;
        if tables.approvals.contains_key(&request.action_id) {
            return Err(StoreError::Duplicate {
                kind: "approval request",
                id: request.action_id,
            });
        }
        tables.approvals.insert(request.action_id.clone(), request);
        Ok(())
    }

    async fn get_approval_request(
        &self,
        action_id: &str,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::GetApprovalRequest)?;
        Ok(tables.approvals.get(action_id).cloned())
    }

    async fn update_approval_request(
        &self,
        action_id: &str,
        update: ApprovalUpdate,
    ) -> Result<ApprovalRequest, StoreError> {
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        tables.check(StoreOperation::UpdateApprovalRequest)?;

        let request = tables
            .approvals
            .get_mut(action_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "approval request",
                id: action_id.to_string(),
            })?;

        if request.status == update.status {
            return Ok(request.clone());
        }
        if !request.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidApprovalTransition {
                from: request.status,
                to: update.status,
            });
        }

        request.status = update.status;
        if update.approved_by.is_some() {
            request.approved_by = update.approved_by;
            request.approved_at = update.approved_at;
        }
        if update.reason.is_some() {
            request.reason = update.reason;
        }
        request.updated_at = now;
        Ok(request.clone())
    }
}

impl std::fmt::Debug for InMemoryActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("InMemoryActionStore")
            .field("actions", &tables.actions.len())
            .field("approvals", &tables.approvals.len())
            .finish_non_exhaustive()
    }
}
