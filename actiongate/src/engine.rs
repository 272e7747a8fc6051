//! Wires a support engine together from configuration.

use crate::actions::{ActionService, ActionStore};
use crate::audit::{AuditSink, AuditTrail, JsonlAuditSink, TracingAuditSink};
use crate::catalog::register_support_tools;
use crate::config::EngineConfig;
use crate::errors::ActiongateError;
use crate::events::{EventSink, LoggingEventSink};
use crate::payments::{AppIntegration, PaymentProcessor, RefundExecutor};
use crate::tools::ToolRegistry;
use crate::utils::{Clock, SystemClock};
use crate::workflow::{ActionApproved, ApprovalWorkflow, ContextLoader};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Reads `path` (or starts from defaults) and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ActiongateError> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env()?)
}

/// The support tools, the approval workflow and the proposal service,
/// sharing one registry and one store.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ToolRegistry>,
    workflow: Arc<ApprovalWorkflow>,
    clock: Arc<dyn Clock>,
    service: ActionService,
}

impl Engine {
    /// Registers the support tools and builds the workflow.
    ///
    /// Audit records go to `audit.jsonl_path` when set, otherwise to the log.
    pub fn from_config(
        config: EngineConfig,
        processor: Arc<dyn PaymentProcessor>,
        integration: Arc<dyn AppIntegration>,
        store: Arc<dyn ActionStore>,
        loader: Arc<dyn ContextLoader>,
    ) -> Result<Self, ActiongateError> {
        let registry = Arc::new(ToolRegistry::new());
        let executor = Arc::new(RefundExecutor::from_config(
            processor,
            integration.clone(),
            &config,
        ));
        register_support_tools(&registry, executor, integration)?;

        let sink: Arc<dyn AuditSink> = match &config.audit.jsonl_path {
            Some(path) => Arc::new(JsonlAuditSink::new(path)),
            None => Arc::new(TracingAuditSink),
        };
        let workflow = Arc::new(
            ApprovalWorkflow::new(registry.clone(), store, loader)
                .with_events(Arc::new(LoggingEventSink::debug()))
                .with_hooks(Arc::new(AuditTrail::from_config(sink, &config.audit)))
                .with_retry(config.workflow.clone())
                .with_claim_lease(config.execution.claim_lease()),
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let service =
            ActionService::new(registry.clone(), workflow.clone()).with_clock(clock.clone());

        info!(tools = ?registry.names(), "engine ready");
        Ok(Self {
            config,
            registry,
            workflow,
            clock,
            service,
        })
    }

    /// Stamps proposals and decisions with `clock`, and judges claim
    /// leases by it.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let workflow = ApprovalWorkflow::clone(&self.workflow).with_clock(clock.clone());
        self.workflow = Arc::new(workflow);
        self.clock = clock;
        self.rebuild_service();
        self
    }

    /// Replaces the workflow's event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        let workflow = ApprovalWorkflow::clone(&self.workflow).with_events(events);
        self.workflow = Arc::new(workflow);
        self.rebuild_service();
        self
    }

    fn rebuild_service(&mut self) {
        self.service = ActionService::new(self.registry.clone(), self.workflow.clone())
            .with_clock(self.clock.clone());
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The registered tools.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The approval workflow.
    #[must_use]
    pub const fn workflow(&self) -> &Arc<ApprovalWorkflow> {
        &self.workflow
    }

    /// Proposal, approval and rejection entry points.
    #[must_use]
    pub const fn service(&self) -> &ActionService {
        &self.service
    }

    /// Runs approval events from `rx` until the channel closes.
    pub fn spawn_listener(&self, rx: mpsc::Receiver<ActionApproved>) -> JoinHandle<()> {
        self.workflow.clone().spawn_listener(rx)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tools", &self.registry.names())
            .field("audit_path", &self.config.audit.jsonl_path)
            .finish_non_exhaustive()
    }
}
