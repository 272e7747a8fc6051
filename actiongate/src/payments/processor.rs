//! Payment processor collaborator.

use super::CapabilityReply;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A refund submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefund {
    /// The charge to refund (the purchase id).
    pub charge_id: String,
    /// Connected account that owns the charge, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Amount to refund in minor units; `None` refunds the remaining balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    /// Free-form reason recorded with the processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Deduplication key; the processor applies at most one refund per key.
    pub idempotency_key: String,
}

/// A refund the processor created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    /// Processor refund id.
    pub id: String,
    /// The refunded charge.
    pub charge_id: String,
    /// Amount refunded in minor units.
    pub amount_cents: i64,
}

/// A charge as the processor sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    /// Processor charge id.
    pub id: String,
    /// Amount charged in minor units.
    pub amount_cents: i64,
    /// Amount refunded so far in minor units.
    pub amount_refunded_cents: i64,
}

impl Charge {
    /// Whether the whole charge has been refunded.
    #[must_use]
    pub const fn is_fully_refunded(&self) -> bool {
        self.amount_refunded_cents >= self.amount_cents
    }
}

/// The payment processor an app's purchases were charged through.
///
/// Every method defaults to [`CapabilityReply::NotImplemented`], so a
/// backend only overrides what it supports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a refund under the request's idempotency key.
    ///
    /// Returns [`CapabilityReply::AlreadyApplied`] when the charge was
    /// already refunded.
    async fn create_refund(&self, request: &CreateRefund) -> CapabilityReply<Refund> {
        let _ = request;
        CapabilityReply::not_implemented("create-refund")
    }

    /// Retrieves a charge.
    async fn retrieve_charge(&self, charge_id: &str) -> CapabilityReply<Charge> {
        let _ = charge_id;
        CapabilityReply::not_implemented("retrieve-charge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnlyProcessor;

    #[async_trait]
    impl PaymentProcessor for ReadOnlyProcessor {
        async fn retrieve_charge(&self, charge_id: &str) -> CapabilityReply<Charge> {
            CapabilityReply::Ok(Charge {
                id: charge_id.to_string(),
                amount_cents: 9900,
                amount_refunded_cents: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_unimplemented_capabilities_report_themselves() {
        let processor = ReadOnlyProcessor;
        let reply = processor
            .create_refund(&CreateRefund {
                charge_id: "order-456".into(),
                account_id: None,
                amount_cents: None,
                reason: None,
                idempotency_key: "refund:order-456:action-123".into(),
            })
            .await;

        assert_eq!(reply, CapabilityReply::NotImplemented("create-refund".into()));
        assert!(processor.retrieve_charge("order-456").await.is_ok());
    }

    #[test]
    fn test_charge_refund_state() {
        let charge = Charge {
            id: "ch_1".into(),
            amount_cents: 500,
            amount_refunded_cents: 500,
        };
        assert!(charge.is_fully_refunded());
    }
}
