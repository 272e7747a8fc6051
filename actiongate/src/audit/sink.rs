//! Audit sinks.

use super::AuditRecord;
use crate::errors::HookError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one record.
    async fn write(&self, record: &AuditRecord) -> Result<(), HookError>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    unavailable: RwLock<bool>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    /// Returns all records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Returns the records written under a trace id.
    #[must_use]
    pub fn records_for_trace(&self, trace_id: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), HookError> {
        if *self.unavailable.read() {
            return Err(HookError::Sink("in-memory sink marked unavailable".to_string()));
        }
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Emits records as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), HookError> {
        if record.requires_reconciliation() {
            warn!(
                tool = %record.tool_name,
                trace_id = %record.trace_id,
                conversation_id = %record.conversation_id,
                app_id = %record.app_id,
                duration_ms = record.duration_ms,
                "tool applied its effect but reconciliation is pending"
            );
        } else {
            info!(
                tool = %record.tool_name,
                trace_id = %record.trace_id,
                conversation_id = %record.conversation_id,
                app_id = %record.app_id,
                duration_ms = record.duration_ms,
                success = record.is_success(),
                error_code = ?record.error_code(),
                "tool audit"
            );
        }
        Ok(())
    }
}

/// Appends records to a JSON Lines file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    /// Creates a sink appending to `path`; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<(), HookError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
