//! Engine configuration.
//!
//! Configuration is plain serde data with per-field defaults, so a partial
//! JSON document (or none at all) yields a working engine. `ACTIONGATE_*`
//! environment variables override file values.

use crate::context::AppConfig;
use crate::errors::ConfigError;
use crate::workflow::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Approval gate settings.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Payment processor call settings.
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// App integration (access revocation) settings.
    #[serde(default)]
    pub integration: IntegrationConfig,
    /// Audit trail settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Workflow step retry settings.
    #[serde(default)]
    pub workflow: RetryConfig,
    /// Execution claim settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies `ACTIONGATE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `ACTIONGATE_*` overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("ACTIONGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("ACTIONGATE_LOG_JSON") {
            self.logging.json = parse_env("ACTIONGATE_LOG_JSON", &json)?;
        }
        if let Some(days) = lookup("ACTIONGATE_REFUND_WINDOW_DAYS") {
            self.approval.refund_window_days = parse_env("ACTIONGATE_REFUND_WINDOW_DAYS", &days)?;
        }
        if let Some(ms) = lookup("ACTIONGATE_PROCESSOR_TIMEOUT_MS") {
            self.processor.timeout_ms = parse_env("ACTIONGATE_PROCESSOR_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("ACTIONGATE_INTEGRATION_TIMEOUT_MS") {
            self.integration.timeout_ms = parse_env("ACTIONGATE_INTEGRATION_TIMEOUT_MS", &ms)?;
        }
        if let Some(url) = lookup("ACTIONGATE_INTEGRATION_URL") {
            self.integration.base_url = Some(url);
        }
        if let Some(token) = lookup("ACTIONGATE_INTEGRATION_TOKEN") {
            self.integration.bearer_token = Some(token);
        }
        if let Some(secs) = lookup("ACTIONGATE_CLAIM_LEASE_SECS") {
            self.execution.claim_lease_secs = parse_env("ACTIONGATE_CLAIM_LEASE_SECS", &secs)?;
        }
        if let Some(path) = lookup("ACTIONGATE_AUDIT_PATH") {
            self.audit.jsonl_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Creates an app config carrying the configured refund window.
    #[must_use]
    pub fn app_config(&self, id: impl Into<String>, slug: impl Into<String>) -> AppConfig {
        AppConfig::new(id, slug).with_refund_window_days(self.approval.refund_window_days)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Approval gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Refunds for purchases older than this many days need a human.
    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: i64,
}

fn default_refund_window_days() -> i64 {
    30
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            refund_window_days: default_refund_window_days(),
        }
    }
}

/// Payment processor call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_processor_timeout_ms")]
    pub timeout_ms: u64,
    /// How many times a timed-out refund may be submitted under its key.
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: usize,
}

fn default_processor_timeout_ms() -> u64 {
    10_000
}

fn default_max_submit_attempts() -> usize {
    2
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_processor_timeout_ms(),
            max_submit_attempts: default_max_submit_attempts(),
        }
    }
}

impl ProcessorConfig {
    /// Gets the timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// App integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Base URL of the app's support integration endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer token sent to the integration endpoint.
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_integration_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_integration_timeout_ms() -> u64 {
    5_000
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            bearer_token: None,
            timeout_ms: default_integration_timeout_ms(),
        }
    }
}

impl IntegrationConfig {
    /// Gets the timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum time a sink write may take before it is abandoned.
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
    /// Append audit records to this JSON Lines file.
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
}

fn default_sink_timeout_ms() -> u64 {
    2_000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink_timeout_ms: default_sink_timeout_ms(),
            jsonl_path: None,
        }
    }
}

impl AuditConfig {
    /// Gets the sink timeout as a Duration.
    #[must_use]
    pub const fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}

/// Execution claim settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Seconds an `executing` claim stays live. A redelivery after that
    /// re-runs the action under the same approval id.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u32,
}

fn default_claim_lease_secs() -> u32 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

impl ExecutionConfig {
    /// Gets the claim lease as a chrono Duration.
    #[must_use]
    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.claim_lease_secs))
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `ACTIONGATE_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
