//! The execution context handed to every tool invocation.

use super::{AppConfig, Purchase, UserIdentity};
use crate::actions::ActionStore;
use crate::audit::{NoOpHooks, ToolHooks};
use crate::utils::{new_trace_id, Clock, SystemClock, Timestamp};
use std::sync::Arc;

/// Identity, history and correlation data for one invocation.
///
/// Build a fresh context per invocation; contexts are cloned into executors
/// but never reused across invocations.
#[derive(Clone)]
pub struct ExecutionContext {
    user: UserIdentity,
    purchases: Vec<Purchase>,
    app: AppConfig,
    trace_id: String,
    conversation_id: String,
    approval_id: Option<String>,
    store: Option<Arc<dyn ActionStore>>,
    clock: Arc<dyn Clock>,
    hooks: Arc<dyn ToolHooks>,
}

impl ExecutionContext {
    /// Creates a context with a fresh trace id, the system clock and no hooks.
    #[must_use]
    pub fn new(user: UserIdentity, app: AppConfig, conversation_id: impl Into<String>) -> Self {
        Self {
            user,
            purchases: Vec::new(),
            app,
            trace_id: new_trace_id(),
            conversation_id: conversation_id.into(),
            approval_id: None,
            store: None,
            clock: Arc::new(SystemClock),
            hooks: Arc::new(NoOpHooks),
        }
    }

    /// Sets the purchase history.
    #[must_use]
    pub fn with_purchases(mut self, purchases: Vec<Purchase>) -> Self {
        self.purchases = purchases;
        self
    }

    /// Sets the trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Binds the invocation to an approval.
    #[must_use]
    pub fn with_approval_id(mut self, approval_id: impl Into<String>) -> Self {
        self.approval_id = Some(approval_id.into());
        self
    }

    /// Attaches a store handle.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ActionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the audit hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ToolHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the customer.
    #[must_use]
    pub const fn user(&self) -> &UserIdentity {
        &self.user
    }

    /// Returns the purchase history.
    #[must_use]
    pub fn purchases(&self) -> &[Purchase] {
        &self.purchases
    }

    /// Looks up a purchase by id.
    #[must_use]
    pub fn find_purchase(&self, purchase_id: &str) -> Option<&Purchase> {
        self.purchases.iter().find(|p| p.id == purchase_id)
    }

    /// Returns the app configuration.
    #[must_use]
    pub const fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Returns the trace id.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Returns the approval id, when the invocation was approved.
    #[must_use]
    pub fn approval_id(&self) -> Option<&str> {
        self.approval_id.as_deref()
    }

    /// Returns the store handle, when one was attached.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn ActionStore>> {
        self.store.as_ref()
    }

    /// Returns the current time from the injected clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns the injected clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the audit hooks.
    #[must_use]
    pub fn hooks(&self) -> &Arc<dyn ToolHooks> {
        &self.hooks
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user", &self.user.id)
            .field("app", &self.app.id)
            .field("purchases", &self.purchases.len())
            .field("trace_id", &self.trace_id)
            .field("conversation_id", &self.conversation_id)
            .field("approval_id", &self.approval_id)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
