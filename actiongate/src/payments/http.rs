//! HTTP app integration.
//!
//! Each app exposes a single support endpoint that accepts
//! `{"action": "<capability>", ...}` JSON bodies. Status codes are
//! classified here, once, into [`CapabilityReply`] variants.

use super::{AppIntegration, CapabilityReply, ProductStatus, RevokeAccess};
use crate::config::IntegrationConfig;
use crate::context::AppConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Calls an app's support endpoint over HTTP.
#[derive(Clone)]
pub struct HttpAppIntegration {
    client: reqwest::Client,
    default_url: Option<String>,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpAppIntegration {
    /// Creates an integration from configuration.
    ///
    /// Apps with their own `integration_url` use it; others fall back to the
    /// configured `base_url`.
    #[must_use]
    pub fn new(config: &IntegrationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_url: config.base_url.clone(),
            bearer_token: config.bearer_token.clone(),
            timeout: config.timeout(),
        }
    }

    /// Uses a preconfigured client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint<'a>(&'a self, app: &'a AppConfig) -> Option<&'a str> {
        app.integration_url
            .as_deref()
            .or(self.default_url.as_deref())
    }

    /// Posts `{"action": action, ...body}` and returns the response when it
    /// succeeded, or the classified reply when it did not.
    async fn send<T>(
        &self,
        app: &AppConfig,
        action: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, CapabilityReply<T>> {
        let Some(url) = self.endpoint(app) else {
            return Err(CapabilityReply::not_implemented(action));
        };

        let mut payload = serde_json::Map::new();
        payload.insert("action".to_string(), serde_json::Value::from(action));
        if let serde_json::Value::Object(fields) = body {
            payload.extend(fields);
        }

        let mut request = self.client.post(url).timeout(self.timeout).json(&payload);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(app_id = %app.id, action, error = %err, "integration request failed");
                return Err(CapabilityReply::unavailable(err.to_string()));
            }
        };

        let status = response.status();
        debug!(app_id = %app.id, action, status = status.as_u16(), "integration responded");
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, action, text))
    }
}

/// Classifies a non-success status into a reply.
pub(crate) fn classify_status<T>(status: StatusCode, action: &str, body: String) -> CapabilityReply<T> {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    match status {
        StatusCode::CONFLICT => CapabilityReply::AlreadyApplied,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CapabilityReply::unauthorized(message),
        StatusCode::NOT_FOUND | StatusCode::NOT_IMPLEMENTED => CapabilityReply::not_implemented(action),
        s if s.is_server_error() => CapabilityReply::unavailable(message),
        _ => CapabilityReply::rejected(message),
    }
}

#[async_trait]
impl AppIntegration for HttpAppIntegration {
    async fn get_product_status(
        &self,
        app: &AppConfig,
        product_id: &str,
    ) -> CapabilityReply<ProductStatus> {
        let body = serde_json::json!({ "productId": product_id });
        let response = match self.send(app, "get-product-status", body).await {
            Ok(response) => response,
            Err(reply) => return reply,
        };
        match response.json::<ProductStatus>().await {
            Ok(status) => CapabilityReply::Ok(status),
            Err(err) => CapabilityReply::rejected(format!("Malformed product status: {err}")),
        }
    }

    async fn revoke_access(&self, app: &AppConfig, request: &RevokeAccess) -> CapabilityReply<()> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(err) => return CapabilityReply::rejected(err.to_string()),
        };
        match self.send(app, "revoke-access", body).await {
            Ok(_) => CapabilityReply::Ok(()),
            Err(reply) => reply,
        }
    }
}

impl std::fmt::Debug for HttpAppIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAppIntegration")
            .field("default_url", &self.default_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
