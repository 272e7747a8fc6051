//! Approval gate: decides whether a proposed call needs a human.
//!
//! Predicates are pure and synchronous. They read time only through the
//! context's clock and fail closed: when the data needed to decide is
//! missing, approval is required.

use crate::context::ExecutionContext;
use crate::tools::ApprovalPredicate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a gate evaluation with the reason behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether a human must approve.
    pub requires_approval: bool,
    /// Why.
    pub reason: String,
}

impl GateDecision {
    fn required(reason: impl Into<String>) -> Self {
        Self {
            requires_approval: true,
            reason: reason.into(),
        }
    }

    fn not_required(reason: impl Into<String>) -> Self {
        Self {
            requires_approval: false,
            reason: reason.into(),
        }
    }
}

/// Evaluates the refund policy for a purchase.
///
/// Approval is required when the purchase is older than the app's
/// auto-approve window or cannot be found.
#[must_use]
pub fn evaluate_refund(purchase_id: &str, ctx: &ExecutionContext) -> GateDecision {
    let Some(purchase) = ctx.find_purchase(purchase_id) else {
        return GateDecision::required(format!("purchase {purchase_id} not found in history"));
    };

    let window = ctx.app().refund_window();
    let age = ctx.now() - purchase.purchased_at;
    if age > window {
        GateDecision::required(format!(
            "purchase is {} days old, auto-approve window is {} days",
            age.num_days(),
            window.num_days()
        ))
    } else {
        GateDecision::not_required(format!(
            "purchase is within the {} day window",
            window.num_days()
        ))
    }
}

/// Whether a refund of `purchase_id` needs approval.
#[must_use]
pub fn refund_requires_approval(purchase_id: &str, ctx: &ExecutionContext) -> bool {
    evaluate_refund(purchase_id, ctx).requires_approval
}

/// A predicate that always requires approval.
#[must_use]
pub fn always<P: 'static>() -> ApprovalPredicate<P> {
    Arc::new(|_: &P, _: &ExecutionContext| true)
}

/// A predicate that never requires approval.
#[must_use]
pub fn never<P: 'static>() -> ApprovalPredicate<P> {
    Arc::new(|_: &P, _: &ExecutionContext| false)
}

/// Applies the refund policy to whichever purchase `purchase_id` selects
/// from the parameters.
pub fn purchase_older_than<P, F>(
    purchase_id: F,
) -> impl Fn(&P, &ExecutionContext) -> bool + Send + Sync + 'static
where
    P: 'static,
    F: Fn(&P) -> &str + Send + Sync + 'static,
{
    move |params: &P, ctx: &ExecutionContext| refund_requires_approval(purchase_id(params), ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AppConfig, Purchase};
    use crate::testing::fixtures;
    use chrono::Duration;

    fn context_with_purchase_age(days: i64) -> ExecutionContext {
        let now = fixtures::now();
        fixtures::context()
            .with_purchases(vec![Purchase::new(
                "order-1",
                "prod-1",
                now - Duration::days(days),
                9_900,
            )])
    }

    #[test]
    fn test_recent_purchase_is_auto_approved() {
        let ctx = context_with_purchase_age(10);
        assert!(!refund_requires_approval("order-1", &ctx));
    }

    #[test]
    fn test_old_purchase_requires_approval() {
        let ctx = context_with_purchase_age(35);
        let decision = evaluate_refund("order-1", &ctx);

        assert!(decision.requires_approval);
        assert!(decision.reason.contains("35 days"));
    }

    #[test]
    fn test_unknown_purchase_fails_closed() {
        let ctx = context_with_purchase_age(1);
        assert!(refund_requires_approval("order-404", &ctx));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let ctx = context_with_purchase_age(30);
        assert!(!refund_requires_approval("order-1", &ctx));
    }

    #[test]
    fn test_app_window_is_respected() {
        let app = AppConfig::new("app-1", "total-typescript").with_refund_window_days(7);
        let now = fixtures::now();
        let ctx = fixtures::context_for_app(app).with_purchases(vec![Purchase::new(
            "order-1",
            "prod-1",
            now - Duration::days(10),
            100,
        )]);

        assert!(refund_requires_approval("order-1", &ctx));
    }

    #[test]
    fn test_future_dated_purchase_is_inside_window() {
        let ctx = context_with_purchase_age(-2);
        assert!(!refund_requires_approval("order-1", &ctx));
    }

    #[test]
    fn test_evaluation_is_pure() {
        let ctx = context_with_purchase_age(35);
        let first = evaluate_refund("order-1", &ctx);
        let second = evaluate_refund("order-1", &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_constant_predicates() {
        let ctx = fixtures::context();
        assert!(always::<()>()(&(), &ctx));
        assert!(!never::<()>()(&(), &ctx));
    }

    #[test]
    fn test_purchase_older_than_reads_params() {
        struct Params {
            purchase_id: String,
        }

        let predicate = purchase_older_than(|p: &Params| p.purchase_id.as_str());
        let ctx = context_with_purchase_age(40);

        assert!(predicate(&Params { purchase_id: "order-1".into() }, &ctx));
    }
}
