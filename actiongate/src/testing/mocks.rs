//! In-process collaborators for tests.

use crate::actions::Action;
use crate::context::{AppConfig, ExecutionContext};
use crate::errors::WorkflowError;
use crate::payments::{
    AppIntegration, CapabilityReply, Charge, CreateRefund, Decline, PaymentProcessor,
    ProductStatus, Refund, RevokeAccess,
};
use crate::workflow::ContextLoader;
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

/// A payment processor that deduplicates by idempotency key.
///
/// A key replays its first refund when reused with the same parameters and
/// is rejected when reused with different ones. A charge that is already
/// fully refunded answers `AlreadyApplied` to any new key.
#[derive(Debug, Default)]
pub struct FakePaymentProcessor {
    state: Mutex<FakeProcessorState>,
}

#[derive(Debug, Default)]
struct FakeProcessorState {
    charges: HashMap<String, Charge>,
    refunds: HashMap<String, (String, Refund)>,
    submitted_keys: Vec<String>,
    refunds_created: usize,
    decline: Option<Decline>,
    first_attempt_delay: Option<Duration>,
}

impl FakePaymentProcessor {
    /// Creates a processor with no charges.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unrefunded charge.
    #[must_use]
    pub fn with_charge(self, id: &str, amount_cents: i64) -> Self {
        self.state.lock().charges.insert(
            id.to_string(),
            Charge {
                id: id.to_string(),
                amount_cents,
                amount_refunded_cents: 0,
            },
        );
        self
    }

    /// Adds a charge that was refunded outside the engine.
    #[must_use]
    pub fn with_refunded_charge(self, id: &str, amount_cents: i64) -> Self {
        self.state.lock().charges.insert(
            id.to_string(),
            Charge {
                id: id.to_string(),
                amount_cents,
                amount_refunded_cents: amount_cents,
            },
        );
        self
    }

    /// Applies the first submission, then stalls before answering it.
    #[must_use]
    pub fn with_first_attempt_delay(self, delay: Duration) -> Self {
        self.state.lock().first_attempt_delay = Some(delay);
        self
    }

    /// Declines every refund from now on.
    pub fn decline_with(&self, decline: Decline) {
        self.state.lock().decline = Some(decline);
    }

    /// Number of refunds that moved money.
    #[must_use]
    pub fn refunds_created(&self) -> usize {
        self.state.lock().refunds_created
    }

    /// Every idempotency key submitted, in order.
    #[must_use]
    pub fn submitted_keys(&self) -> Vec<String> {
        self.state.lock().submitted_keys.clone()
    }

    /// Current state of a charge.
    #[must_use]
    pub fn charge(&self, id: &str) -> Option<Charge> {
        self.state.lock().charges.get(id).cloned()
    }

    fn apply(&self, request: &CreateRefund) -> (CapabilityReply<Refund>, Option<Duration>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.submitted_keys.push(request.idempotency_key.clone());
        let delay = state.first_attempt_delay.take();

        if let Some(decline) = &state.decline {
            return (CapabilityReply::Declined(decline.clone()), delay);
        }

        let fingerprint = fingerprint(request);
        if let Some((seen, refund)) = state.refunds.get(&request.idempotency_key) {
            let reply = if *seen == fingerprint {
                CapabilityReply::Ok(refund.clone())
            } else {
                CapabilityReply::rejected(
                    "Keys for idempotent requests can only be used with the same parameters",
                )
            };
            return (reply, delay);
        }

        let Some(charge) = state.charges.get_mut(&request.charge_id) else {
            let reply = CapabilityReply::rejected(format!("No such charge: '{}'", request.charge_id));
            return (reply, delay);
        };
        if charge.is_fully_refunded() {
            return (CapabilityReply::AlreadyApplied, delay);
        }

        let amount = request
            .amount_cents
            .unwrap_or(charge.amount_cents - charge.amount_refunded_cents);
        charge.amount_refunded_cents += amount;
        let refund = Refund {
            id: format!("re_{}", state.refunds.len() + 1),
            charge_id: request.charge_id.clone(),
            amount_cents: amount,
        };
        state.refunds_created += 1;
        state.refunds.insert(
            request.idempotency_key.clone(),
            (fingerprint, refund.clone()),
        );
        (CapabilityReply::Ok(refund), delay)
    }
}

fn fingerprint(request: &CreateRefund) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.charge_id.as_bytes());
    hasher.update(request.account_id.as_deref().unwrap_or_default().as_bytes());
    hasher.update(request.amount_cents.unwrap_or(-1).to_le_bytes());
    hasher.update(request.reason.as_deref().unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl PaymentProcessor for FakePaymentProcessor {
    async fn create_refund(&self, request: &CreateRefund) -> CapabilityReply<Refund> {
        let (reply, delay) = self.apply(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn retrieve_charge(&self, charge_id: &str) -> CapabilityReply<Charge> {
        match self.charge(charge_id) {
            Some(charge) => CapabilityReply::Ok(charge),
            None => CapabilityReply::rejected(format!("No such charge: '{charge_id}'")),
        }
    }
}

/// An app integration that records calls and answers with canned replies.
#[derive(Debug)]
pub struct RecordingIntegration {
    revoke_reply: Mutex<CapabilityReply<()>>,
    product_reply: Mutex<CapabilityReply<ProductStatus>>,
    revocations: Mutex<Vec<RevokeAccess>>,
    lookups: Mutex<Vec<String>>,
}

impl Default for RecordingIntegration {
    fn default() -> Self {
        Self {
            revoke_reply: Mutex::new(CapabilityReply::Ok(())),
            product_reply: Mutex::new(CapabilityReply::not_implemented("get-product-status")),
            revocations: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingIntegration {
    /// Revokes successfully; product lookups are not implemented.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers revocations with `reply`.
    #[must_use]
    pub fn with_revoke_reply(self, reply: CapabilityReply<()>) -> Self {
        *self.revoke_reply.lock() = reply;
        self
    }

    /// Answers product lookups with `status`.
    #[must_use]
    pub fn with_product_status(self, status: ProductStatus) -> Self {
        self.with_product_reply(CapabilityReply::Ok(status))
    }

    /// Answers product lookups with `reply`.
    #[must_use]
    pub fn with_product_reply(self, reply: CapabilityReply<ProductStatus>) -> Self {
        *self.product_reply.lock() = reply;
        self
    }

    /// Every revocation received.
    #[must_use]
    pub fn revocations(&self) -> Vec<RevokeAccess> {
        self.revocations.lock().clone()
    }

    /// Every product id looked up.
    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl AppIntegration for RecordingIntegration {
    async fn get_product_status(
        &self,
        _app: &AppConfig,
        product_id: &str,
    ) -> CapabilityReply<ProductStatus> {
        self.lookups.lock().push(product_id.to_string());
        self.product_reply.lock().clone()
    }

    async fn revoke_access(&self, _app: &AppConfig, request: &RevokeAccess) -> CapabilityReply<()> {
        self.revocations.lock().push(request.clone());
        self.revoke_reply.lock().clone()
    }
}

/// Loads the same context for every action.
#[derive(Debug)]
pub struct StaticContextLoader {
    context: ExecutionContext,
    failures: Mutex<Option<(usize, bool)>>,
    loads: Mutex<usize>,
}

impl StaticContextLoader {
    /// Returns clones of `context`.
    #[must_use]
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            failures: Mutex::new(None),
            loads: Mutex::new(0),
        }
    }

    /// Fails the next `times` loads; `retryable` marks them transient.
    pub fn fail_next(&self, times: usize, retryable: bool) {
        *self.failures.lock() = Some((times, retryable));
    }

    /// How many loads were attempted.
    #[must_use]
    pub fn loads(&self) -> usize {
        *self.loads.lock()
    }
}

#[async_trait]
impl ContextLoader for StaticContextLoader {
    async fn load(&self, action: &Action) -> Result<ExecutionContext, WorkflowError> {
        *self.loads.lock() += 1;
        let mut failures = self.failures.lock();
        if let Some((remaining, retryable)) = failures.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(WorkflowError::Context {
                    action_id: action.id.clone(),
                    message: "customer record unavailable".to_string(),
                    retryable: *retryable,
                });
            }
        }
        Ok(self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refund(key: &str, reason: Option<&str>) -> CreateRefund {
        CreateRefund {
            charge_id: "order-456".into(),
            account_id: None,
            amount_cents: None,
            reason: reason.map(str::to_string),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_fake_processor_replays_keys() {
        let processor = FakePaymentProcessor::new().with_charge("order-456", 500);

        let first = processor.create_refund(&refund("k1", None)).await;
        let again = processor.create_refund(&refund("k1", None)).await;
        assert_eq!(first, again);
        assert_eq!(processor.refunds_created(), 1);

        let other_key = processor.create_refund(&refund("k2", None)).await;
        assert_eq!(other_key, CapabilityReply::AlreadyApplied);

        let reused = processor.create_refund(&refund("k1", Some("changed"))).await;
        assert!(matches!(reused, CapabilityReply::Declined(_)));
    }

    #[tokio::test]
    async fn test_static_loader_failures() {
        let loader = StaticContextLoader::new(crate::testing::fixtures::context());
        let action = crate::testing::fixtures::approved_refund_action("action-1", "order-456");
        loader.fail_next(1, true);

        let err = loader.load(&action).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(loader.load(&action).await.is_ok());
        assert_eq!(loader.loads(), 2);
    }
}
