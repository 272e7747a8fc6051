//! Customer, purchase and app records carried in a context.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// The customer an action is performed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// The user ID in the app's system.
    pub id: String,
    /// The user's email.
    pub email: String,
    /// Display name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserIdentity {
    /// Creates a user identity.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Lifecycle of a purchase as reported by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Paid and active.
    #[default]
    Active,
    /// Fully refunded.
    Refunded,
    /// Under dispute with the card issuer.
    Disputed,
}

/// A purchase in the customer's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    /// The purchase ID; also the processor charge reference.
    pub id: String,
    /// The product ID.
    pub product_id: String,
    /// The product name.
    pub product_name: String,
    /// When the purchase was made.
    pub purchased_at: Timestamp,
    /// Amount paid, in minor units.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Current status.
    #[serde(default)]
    pub status: PurchaseStatus,
}

impl Purchase {
    /// Creates an active purchase.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        product_id: impl Into<String>,
        purchased_at: Timestamp,
        amount_cents: i64,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            id: id.into(),
            product_name: product_id.clone(),
            product_id,
            purchased_at,
            amount_cents,
            currency: "usd".to_string(),
            status: PurchaseStatus::Active,
        }
    }

    /// Sets the product name.
    #[must_use]
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: PurchaseStatus) -> Self {
        self.status = status;
        self
    }
}

/// Configuration of the app (product storefront) an action belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// The app ID.
    pub id: String,
    /// URL-safe slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Refunds inside this window are auto-approved.
    #[serde(default = "default_refund_window_days")]
    pub auto_approve_refund_days: i64,
    /// The connected payment account, when the app has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_account_id: Option<String>,
    /// The app's support integration endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_url: Option<String>,
}

fn default_refund_window_days() -> i64 {
    30
}

impl AppConfig {
    /// Creates an app config with the default refund window.
    #[must_use]
    pub fn new(id: impl Into<String>, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id: id.into(),
            name: slug.clone(),
            slug,
            auto_approve_refund_days: default_refund_window_days(),
            payment_account_id: None,
            integration_url: None,
        }
    }

    /// Sets the auto-approval refund window.
    #[must_use]
    pub const fn with_refund_window_days(mut self, days: i64) -> Self {
        self.auto_approve_refund_days = days;
        self
    }

    /// Sets the connected payment account.
    #[must_use]
    pub fn with_payment_account(mut self, account_id: impl Into<String>) -> Self {
        self.payment_account_id = Some(account_id.into());
        self
    }

    /// Returns the refund window as a duration.
    #[must_use]
    pub fn refund_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.auto_approve_refund_days)
    }
}
