//! App integration collaborator: the app's own access-control backend.

use super::CapabilityReply;
use crate::context::AppConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Access the customer holds for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatus {
    /// The product id.
    pub product_id: String,
    /// Whether the product is available for sale.
    pub available: bool,
    /// Seats or units left, when the product is limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_remaining: Option<i64>,
    /// Free-form state reported by the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Removes a customer's access after a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAccess {
    /// The refunded purchase.
    pub purchase_id: String,
    /// The customer in the app's system.
    pub user_id: String,
    /// The product to revoke.
    pub product_id: String,
    /// Why access is being removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The capabilities an app exposes to the support engine.
///
/// Apps implement a subset; unimplemented methods answer
/// [`CapabilityReply::NotImplemented`].
#[async_trait]
pub trait AppIntegration: Send + Sync {
    /// Reports availability of a product.
    async fn get_product_status(
        &self,
        app: &AppConfig,
        product_id: &str,
    ) -> CapabilityReply<ProductStatus> {
        let _ = (app, product_id);
        CapabilityReply::not_implemented("get-product-status")
    }

    /// Revokes the customer's access to a refunded purchase.
    ///
    /// Revoking access that is already gone answers
    /// [`CapabilityReply::AlreadyApplied`].
    async fn revoke_access(&self, app: &AppConfig, request: &RevokeAccess) -> CapabilityReply<()> {
        let _ = (app, request);
        CapabilityReply::not_implemented("revoke-access")
    }
}

/// An integration that implements nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedIntegration;

#[async_trait]
impl AppIntegration for UnsupportedIntegration {}
