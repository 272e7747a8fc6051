//! Hook implementation that times tool calls and writes audit records.

use super::{AuditOutcome, AuditRecord, AuditSink, HookContext, ToolHooks};
use crate::config::AuditConfig;
use crate::errors::{HookError, ToolErrorInfo};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Timing key: concurrent calls of one tool under different traces are
/// tracked independently.
type TimingKey = (String, String);

/// Audit hooks backed by an [`AuditSink`].
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    started: DashMap<TimingKey, Instant>,
    write_timeout: Duration,
}

impl AuditTrail {
    /// Creates a trail writing to `sink` with a two second write timeout.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            started: DashMap::new(),
            write_timeout: AuditConfig::default().sink_timeout(),
        }
    }

    /// Creates a trail using the configured write timeout.
    #[must_use]
    pub fn from_config(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        Self::new(sink).with_write_timeout(config.sink_timeout())
    }

    /// Sets the sink write timeout.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Number of calls started but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.started.len()
    }

    fn key(call: &HookContext) -> TimingKey {
        (call.trace_id.clone(), call.tool_name.clone())
    }

    fn take_duration_ms(&self, call: &HookContext) -> u64 {
        self.started
            .remove(&Self::key(call))
            .map_or(0, |(_, started)| {
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
            })
    }

    async fn record(&self, call: &HookContext, outcome: AuditOutcome) -> Result<(), HookError> {
        let record = AuditRecord {
            tool_name: call.tool_name.clone(),
            parameters: call.parameters.clone(),
            outcome,
            duration_ms: self.take_duration_ms(call),
            trace_id: call.trace_id.clone(),
            conversation_id: call.conversation_id.clone(),
            app_id: call.app_id.clone(),
            recorded_at: chrono::Utc::now(),
        };

        match tokio::time::timeout(self.write_timeout, self.sink.write(&record)).await {
            Ok(result) => result,
            Err(_) => Err(HookError::Timeout {
                timeout_ms: u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl ToolHooks for AuditTrail {
    async fn before_execute(&self, call: &HookContext) -> Result<(), HookError> {
        self.started.insert(Self::key(call), Instant::now());
        Ok(())
    }

    async fn after_execute(
        &self,
        call: &HookContext,
        result: &serde_json::Value,
    ) -> Result<(), HookError> {
        self.record(
            call,
            AuditOutcome::Success {
                result: result.clone(),
            },
        )
        .await
    }

    async fn on_error(&self, call: &HookContext, error: &ToolErrorInfo) -> Result<(), HookError> {
        if error.code == crate::errors::ErrorCode::PartialCompletion {
            warn!(
                tool = %call.tool_name,
                trace_id = %call.trace_id,
                message = %error.message,
                "effect applied, reconciliation pending"
            );
        }
        self.record(call, AuditOutcome::Error { error: error.clone() }).await
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("in_flight", &self.in_flight())
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
