//! Canned identities, purchases and contexts.
//!
//! Everything is anchored to [`now`], a fixed instant, so purchase ages and
//! gate decisions are the same on every run.

use crate::actions::{Action, ToolCall};
use crate::context::{AppConfig, ExecutionContext, Purchase, UserIdentity};
use crate::utils::{FixedClock, Timestamp};
use chrono::Duration;
use std::sync::Arc;

/// The customer's id.
pub const USER_ID: &str = "user-1";
/// The app's id.
pub const APP_ID: &str = "app-1";
/// The conversation every fixture action belongs to.
pub const CONVERSATION_ID: &str = "conv-1";
/// The trace id of [`context`].
pub const TRACE_ID: &str = "trace-1";
/// A purchase made 10 days before [`now`] (inside the refund window).
pub const RECENT_PURCHASE: &str = "order-456";
/// A purchase made 35 days before [`now`] (outside the refund window).
pub const OLD_PURCHASE: &str = "order-789";

/// 2024-06-01T12:00:00Z.
#[must_use]
pub fn now() -> Timestamp {
    chrono::DateTime::from_timestamp(1_717_243_200, 0).unwrap_or_default()
}

/// A clock frozen at [`now`].
#[must_use]
pub fn clock() -> FixedClock {
    FixedClock::new(now())
}

/// The fixture customer.
#[must_use]
pub fn user() -> UserIdentity {
    UserIdentity::new(USER_ID, "customer@example.com").with_name("Ada Customer")
}

/// The fixture app, with the default 30 day window.
#[must_use]
pub fn app() -> AppConfig {
    AppConfig::new(APP_ID, "total-typescript").with_payment_account("acct_1")
}

/// A purchase of `course-1` made `days` before [`now`].
#[must_use]
pub fn purchase_days_ago(id: &str, days: i64) -> Purchase {
    Purchase::new(id, "course-1", now() - Duration::days(days), 9_900)
}

/// [`RECENT_PURCHASE`] and [`OLD_PURCHASE`].
#[must_use]
pub fn purchases() -> Vec<Purchase> {
    vec![
        purchase_days_ago(RECENT_PURCHASE, 10),
        purchase_days_ago(OLD_PURCHASE, 35),
    ]
}

/// A context for the fixture customer and app at [`now`].
#[must_use]
pub fn context() -> ExecutionContext {
    context_for_app(app())
}

/// Like [`context`], for a different app.
#[must_use]
pub fn context_for_app(app: AppConfig) -> ExecutionContext {
    ExecutionContext::new(user(), app, CONVERSATION_ID)
        .with_purchases(purchases())
        .with_trace_id(TRACE_ID)
        .with_clock(Arc::new(clock()))
}

/// An approved `pending-action` refunding `purchase_id`.
#[must_use]
pub fn approved_refund_action(action_id: &str, purchase_id: &str) -> Action {
    let call = ToolCall::new(
        "processRefund",
        serde_json::json!({ "purchaseId": purchase_id }),
    );
    Action::pending(&[call], CONVERSATION_ID, APP_ID, now())
        .with_id(action_id)
        .with_status(crate::actions::ActionStatus::Approved)
}
