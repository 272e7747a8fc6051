//! Support tools an agent can propose.
//!
//! `processRefund` moves money and is gated by the refund policy;
//! `getProductStatus` is read-only and never needs approval.

use crate::approval::purchase_older_than;
use crate::context::ExecutionContext;
use crate::errors::{RegistryError, ToolError};
use crate::payments::{AppIntegration, ProductStatus, RefundExecutor, RefundReceipt, RefundRequest};
use crate::tools::{Tool, ToolDefinition, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the refund tool.
pub const PROCESS_REFUND: &str = "processRefund";
/// Name of the product status tool.
pub const GET_PRODUCT_STATUS: &str = "getProductStatus";

/// Parameters of `processRefund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundParams {
    /// The purchase to refund.
    pub purchase_id: String,
    /// Why the refund is granted.
    #[serde(default)]
    pub reason: Option<String>,
}

fn refund_purchase_id(params: &ProcessRefundParams) -> &str {
    &params.purchase_id
}

/// Parameters of `getProductStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatusParams {
    /// The product to look up.
    pub product_id: String,
}

/// Builds the `processRefund` tool.
///
/// The refund is keyed on the approval bound to the context, so the tool
/// refuses to run outside an approved action.
pub fn process_refund_tool(
    executor: Arc<RefundExecutor>,
) -> Result<Tool<ProcessRefundParams, RefundReceipt>, RegistryError> {
    let definition = ToolDefinition::new(PROCESS_REFUND)
        .with_description(
            "Refund a purchase in full and revoke the customer's access to it. \
             Refunds of purchases older than the app's auto-approve window need approval.",
        )
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "purchaseId": { "type": "string", "minLength": 1 },
                "reason": { "type": "string" }
            },
            "required": ["purchaseId"],
            "additionalProperties": false
        }));

    let tool = Tool::from_fn(
        definition,
        move |params: ProcessRefundParams, ctx: ExecutionContext| {
            let executor = Arc::clone(&executor);
            async move {
                let approval_id = ctx.approval_id().map(str::to_owned).ok_or_else(|| {
                    ToolError::from(anyhow::anyhow!(
                        "{PROCESS_REFUND} must run under an approved action"
                    ))
                })?;
                let request = RefundRequest {
                    purchase_id: params.purchase_id,
                    app_id: ctx.app().id.clone(),
                    reason: params.reason,
                };
                executor.execute(&request, &approval_id, &ctx).await
            }
        },
    )?;

    Ok(tool.with_approval(purchase_older_than(refund_purchase_id)))
}

/// Builds the `getProductStatus` tool.
pub fn product_status_tool(
    integration: Arc<dyn AppIntegration>,
) -> Result<Tool<ProductStatusParams, ProductStatus>, RegistryError> {
    let definition = ToolDefinition::new(GET_PRODUCT_STATUS)
        .with_description("Report whether a product is available and how many units remain.")
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "productId": { "type": "string", "minLength": 1 }
            },
            "required": ["productId"]
        }));

    Tool::from_fn(
        definition,
        move |params: ProductStatusParams, ctx: ExecutionContext| {
            let integration = Arc::clone(&integration);
            async move {
                integration
                    .get_product_status(ctx.app(), &params.product_id)
                    .await
                    .into_result(GET_PRODUCT_STATUS)
            }
        },
    )
}

/// Registers every support tool.
pub fn register_support_tools(
    registry: &ToolRegistry,
    executor: Arc<RefundExecutor>,
    integration: Arc<dyn AppIntegration>,
) -> Result<(), RegistryError> {
    registry.register(process_refund_tool(executor)?)?;
    registry.register(product_status_tool(integration)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::payments::{CapabilityReply, UnsupportedIntegration};
    use crate::testing::{fixtures, FakePaymentProcessor, RecordingIntegration};
    use pretty_assertions::assert_eq;

    fn registry(integration: Arc<dyn AppIntegration>) -> (ToolRegistry, Arc<FakePaymentProcessor>) {
        let processor = Arc::new(FakePaymentProcessor::new().with_charge("order-456", 9_900));
        let executor = Arc::new(RefundExecutor::new(processor.clone(), integration.clone()));
        let registry = ToolRegistry::new();
        register_support_tools(&registry, executor, integration).unwrap();
        (registry, processor)
    }

    #[test]
    fn test_tools_are_listed() {
        let (registry, _) = registry(Arc::new(RecordingIntegration::new()));
        assert_eq!(registry.names(), vec![GET_PRODUCT_STATUS, PROCESS_REFUND]);
    }

    #[test]
    fn test_refund_gate_follows_purchase_age() {
        let (registry, _) = registry(Arc::new(RecordingIntegration::new()));
        let ctx = fixtures::context();

        let recent = serde_json::json!({"purchaseId": fixtures::RECENT_PURCHASE});
        let old = serde_json::json!({"purchaseId": fixtures::OLD_PURCHASE});
        let unknown = serde_json::json!({"purchaseId": "order-404"});

        assert!(!registry.requires_approval(PROCESS_REFUND, &recent, &ctx));
        assert!(registry.requires_approval(PROCESS_REFUND, &old, &ctx));
        assert!(registry.requires_approval(PROCESS_REFUND, &unknown, &ctx));
        assert!(!registry.requires_approval(
            GET_PRODUCT_STATUS,
            &serde_json::json!({"productId": "course-1"}),
            &ctx
        ));
    }

    #[tokio::test]
    async fn test_refund_requires_an_approval_id() {
        let (registry, processor) = registry(Arc::new(RecordingIntegration::new()));

        let result = registry
            .execute(
                PROCESS_REFUND,
                serde_json::json!({"purchaseId": "order-456"}),
                &fixtures::context(),
            )
            .await;

        assert_eq!(result.error_code(), Some(ErrorCode::ExecutionError));
        assert_eq!(processor.refunds_created(), 0);
    }

    #[tokio::test]
    async fn test_refund_under_approval() {
        let (registry, processor) = registry(Arc::new(RecordingIntegration::new()));
        let ctx = fixtures::context().with_approval_id("action-123");

        let result = registry
            .execute(
                PROCESS_REFUND,
                serde_json::json!({"purchaseId": "order-456", "reason": "never used it"}),
                &ctx,
            )
            .await;

        let data = result.data().unwrap();
        assert_eq!(data["idempotencyKey"], "refund:order-456:action-123");
        assert_eq!(data["accessRevoked"], true);
        assert_eq!(processor.refunds_created(), 1);
    }

    #[tokio::test]
    async fn test_refund_rejects_unknown_fields() {
        let (registry, processor) = registry(Arc::new(RecordingIntegration::new()));
        let ctx = fixtures::context().with_approval_id("action-123");

        let result = registry
            .execute(
                PROCESS_REFUND,
                serde_json::json!({"purchaseId": "order-456", "amount": 1}),
                &ctx,
            )
            .await;

        assert_eq!(result.error_code(), Some(ErrorCode::ValidationError));
        assert_eq!(processor.refunds_created(), 0);
    }

    #[tokio::test]
    async fn test_product_status() {
        let integration = Arc::new(RecordingIntegration::new().with_product_status(ProductStatus {
            product_id: "course-1".into(),
            available: true,
            quantity_remaining: Some(12),
            state: None,
        }));
        let (registry, _) = registry(integration);

        let result = registry
            .execute(
                GET_PRODUCT_STATUS,
                serde_json::json!({"productId": "course-1"}),
                &fixtures::context(),
            )
            .await;

        assert_eq!(result.data().unwrap()["quantityRemaining"], 12);
    }

    #[tokio::test]
    async fn test_unsupported_capability_is_not_implemented() {
        let (registry, _) = registry(Arc::new(UnsupportedIntegration));

        let result = registry
            .execute(
                GET_PRODUCT_STATUS,
                serde_json::json!({"productId": "course-1"}),
                &fixtures::context(),
            )
            .await;

        assert_eq!(result.error_code(), Some(ErrorCode::NotImplemented));
    }

    #[tokio::test]
    async fn test_declined_product_lookup_keeps_message() {
        let integration = Arc::new(
            RecordingIntegration::new()
                .with_product_reply(CapabilityReply::unauthorized("app token expired")),
        );
        let (registry, _) = registry(integration);

        let result = registry
            .execute(
                GET_PRODUCT_STATUS,
                serde_json::json!({"productId": "course-1"}),
                &fixtures::context(),
            )
            .await;

        let error = result.error_info().unwrap();
        assert_eq!(error.code, ErrorCode::AuthorizationError);
        assert_eq!(error.message, "app token expired");
    }
}
