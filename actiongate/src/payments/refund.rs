//! Idempotent refund execution.
//!
//! A refund is submitted under a key derived from the purchase and the
//! approval that authorized it, so redelivered approvals and resubmitted
//! calls collapse onto a single financial effect. Once the refund is
//! confirmed the customer's access is revoked; if that second call fails the
//! refund is still reported, flagged as a partial completion that needs
//! reconciliation.

use super::{AppIntegration, CapabilityReply, CreateRefund, PaymentProcessor, Refund, RevokeAccess};
use crate::config::{EngineConfig, ProcessorConfig};
use crate::context::{ExecutionContext, Purchase};
use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconciliation marker attached to partial completions.
pub const ACCESS_REVOCATION_PENDING: &str = "access_revocation_pending";

/// Derives the idempotency key for refunding `purchase_id` under `approval_id`.
#[must_use]
pub fn idempotency_key(purchase_id: &str, approval_id: &str) -> String {
    format!("refund:{purchase_id}:{approval_id}")
}

/// What to refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// The purchase to refund.
    pub purchase_id: String,
    /// The app the purchase belongs to.
    pub app_id: String,
    /// Why the refund was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RefundRequest {
    /// Creates a request without a reason.
    #[must_use]
    pub fn new(purchase_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            purchase_id: purchase_id.into(),
            app_id: app_id.into(),
            reason: None,
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Proof of a confirmed refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    /// The refunded purchase.
    pub purchase_id: String,
    /// Processor refund id; absent when the refund predates this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    /// Amount refunded, when the processor reported it.
    pub amount_refunded_cents: Option<i64>,
    /// The key the refund was submitted under.
    pub idempotency_key: String,
    /// True when the processor had already refunded the charge.
    pub already_applied: bool,
    /// True once the customer's access was removed.
    pub access_revoked: bool,
}

enum Submission {
    Created(Refund),
    AlreadyApplied,
}

/// Executes refunds against a payment processor and an app integration.
pub struct RefundExecutor {
    processor: Arc<dyn PaymentProcessor>,
    integration: Arc<dyn AppIntegration>,
    config: ProcessorConfig,
    integration_timeout: Duration,
}

impl RefundExecutor {
    /// Creates an executor with default timeouts.
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, integration: Arc<dyn AppIntegration>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            processor,
            integration,
            config: defaults.processor,
            integration_timeout: defaults.integration.timeout(),
        }
    }

    /// Creates an executor using the engine configuration's timeouts.
    #[must_use]
    pub fn from_config(
        processor: Arc<dyn PaymentProcessor>,
        integration: Arc<dyn AppIntegration>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            processor,
            integration,
            config: config.processor.clone(),
            integration_timeout: config.integration.timeout(),
        }
    }

    /// Overrides the processor call settings.
    #[must_use]
    pub fn with_processor_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the access revocation timeout.
    #[must_use]
    pub const fn with_integration_timeout(mut self, timeout: Duration) -> Self {
        self.integration_timeout = timeout;
        self
    }

    /// Refunds a purchase and revokes the customer's access.
    ///
    /// Calling this again with the same purchase and approval never creates
    /// a second refund.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(purchase_id = %request.purchase_id, approval_id = %approval_id)
    )]
    pub async fn execute(
        &self,
        request: &RefundRequest,
        approval_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<RefundReceipt, ToolError> {
        if request.app_id != ctx.app().id {
            return Err(ToolError::validation(format!(
                "Purchase {} belongs to app {}, not {}",
                request.purchase_id,
                ctx.app().id,
                request.app_id
            )));
        }
        let purchase = ctx
            .find_purchase(&request.purchase_id)
            .ok_or_else(|| ToolError::not_found("purchase", &request.purchase_id))?;

        let key = idempotency_key(&purchase.id, approval_id);
        let submission = CreateRefund {
            charge_id: purchase.id.clone(),
            account_id: ctx.app().payment_account_id.clone(),
            amount_cents: None,
            reason: request.reason.clone(),
            idempotency_key: key.clone(),
        };

        let mut receipt = match self.submit(&submission).await? {
            Submission::Created(refund) => {
                info!(refund_id = %refund.id, amount_cents = refund.amount_cents, key = %key, "refund created");
                RefundReceipt {
                    purchase_id: purchase.id.clone(),
                    refund_id: Some(refund.id),
                    amount_refunded_cents: Some(refund.amount_cents),
                    idempotency_key: key,
                    already_applied: false,
                    access_revoked: false,
                }
            }
            Submission::AlreadyApplied => {
                let amount = self.refunded_amount(&purchase.id).await;
                info!(key = %key, amount_cents = ?amount, "refund already applied");
                RefundReceipt {
                    purchase_id: purchase.id.clone(),
                    refund_id: None,
                    amount_refunded_cents: amount,
                    idempotency_key: key,
                    already_applied: true,
                    access_revoked: false,
                }
            }
        };

        self.revoke(purchase, request, ctx).await.map_err(|cause| {
            warn!(
                purchase_id = %purchase.id,
                error = %cause,
                "refund applied but access revocation failed"
            );
            ToolError::PartialCompletion {
                message: format!(
                    "Refund for {} was applied but access revocation failed: {cause}",
                    purchase.id
                ),
                details: serde_json::json!({
                    "receipt": receipt,
                    "reconciliation": ACCESS_REVOCATION_PENDING,
                    "cause": cause.to_info(),
                }),
            }
        })?;

        receipt.access_revoked = true;
        Ok(receipt)
    }

    async fn submit(&self, submission: &CreateRefund) -> Result<Submission, ToolError> {
        let attempts = self.config.max_submit_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reply =
                tokio::time::timeout(self.config.timeout(), self.processor.create_refund(submission))
                    .await;

            let err = match reply {
                Ok(CapabilityReply::Ok(refund)) => return Ok(Submission::Created(refund)),
                Ok(CapabilityReply::AlreadyApplied) => return Ok(Submission::AlreadyApplied),
                Ok(CapabilityReply::NotImplemented(capability)) => {
                    return Err(ToolError::not_implemented(capability))
                }
                Ok(CapabilityReply::Declined(decline)) if decline.is_transient() => {
                    decline.into_tool_error("create-refund")
                }
                Ok(CapabilityReply::Declined(decline)) => {
                    return Err(decline.into_tool_error("create-refund"))
                }
                Err(_) => ToolError::Timeout {
                    operation: "create-refund".to_string(),
                    timeout_ms: self.config.timeout_ms,
                },
            };

            if attempt >= attempts {
                return Err(err);
            }
            warn!(
                key = %submission.idempotency_key,
                attempt,
                error = %err,
                "refund submission unconfirmed, resubmitting under the same key"
            );
        }
    }

    async fn refunded_amount(&self, charge_id: &str) -> Option<i64> {
        match tokio::time::timeout(self.config.timeout(), self.processor.retrieve_charge(charge_id))
            .await
        {
            Ok(CapabilityReply::Ok(charge)) => Some(charge.amount_refunded_cents),
            Ok(other) => {
                warn!(charge_id, reply = ?other, "could not read refunded amount");
                None
            }
            Err(_) => {
                warn!(charge_id, "timed out reading refunded amount");
                None
            }
        }
    }

    async fn revoke(
        &self,
        purchase: &Purchase,
        request: &RefundRequest,
        ctx: &ExecutionContext,
    ) -> Result<(), ToolError> {
        let revoke = RevokeAccess {
            purchase_id: purchase.id.clone(),
            user_id: ctx.user().id.clone(),
            product_id: purchase.product_id.clone(),
            reason: request.reason.clone(),
        };
        let reply = tokio::time::timeout(
            self.integration_timeout,
            self.integration.revoke_access(ctx.app(), &revoke),
        )
        .await
        .map_err(|_| ToolError::Timeout {
            operation: "revoke-access".to_string(),
            timeout_ms: u64::try_from(self.integration_timeout.as_millis()).unwrap_or(u64::MAX),
        })?;

        match reply {
            CapabilityReply::Ok(()) => Ok(()),
            CapabilityReply::AlreadyApplied => {
                debug!(purchase_id = %purchase.id, "access was already revoked");
                Ok(())
            }
            CapabilityReply::Declined(decline) => Err(decline.into_tool_error("revoke-access")),
            CapabilityReply::NotImplemented(capability) => {
                Err(ToolError::not_implemented(capability))
            }
        }
    }
}

impl std::fmt::Debug for RefundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefundExecutor")
            .field("config", &self.config)
            .field("integration_timeout", &self.integration_timeout)
            .finish_non_exhaustive()
    }
}
