//! CloudPayments REST API client.
//!
//! Payment links via `orders/create`, recurring agreements via the
//! `subscriptions/*` endpoints. All calls authenticate with HTTP Basic
//! auth (public id + API secret).

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::domain::catalog::Catalog;
use crate::ports::{
    BillingGateway, CheckoutRequest, GatewayError, GatewayInvoice, GatewaySubscription,
    GatewaySubscriptionStatus,
};

/// CloudPayments API configuration.
#[derive(Clone)]
pub struct CloudPaymentsClientConfig {
    /// Public id of the merchant account.
    pub public_id: String,
    /// API secret; doubles as the webhook HMAC key.
    pub api_secret: SecretString,
    pub api_base_url: String,
    /// Where the payer lands after a completed payment.
    pub success_redirect_url: String,
}

impl CloudPaymentsClientConfig {
    pub fn new(
        public_id: impl Into<String>,
        api_secret: impl Into<String>,
        success_redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            public_id: public_id.into(),
            api_secret: SecretString::new(api_secret.into()),
            api_base_url: "https://api.cloudpayments.ru".to_string(),
            success_redirect_url: success_redirect_url.into(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct CloudPaymentsClient {
    config: CloudPaymentsClientConfig,
    catalog: Arc<Catalog>,
    http_client: reqwest::Client,
}

/// Envelope every CloudPayments endpoint answers with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiEnvelope<T> {
    success: bool,
    message: Option<String>,
    model: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderModel {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubscriptionModel {
    id: String,
    status: String,
}

impl CloudPaymentsClient {
    pub fn new(config: CloudPaymentsClientConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            config,
            catalog,
            http_client: reqwest::Client::new(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .post(format!("{}{}", self.config.api_base_url, path))
            .basic_auth(
                &self.config.public_id,
                Some(self.config.api_secret.expose_secret()),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("CloudPayments request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "CloudPayments {} failed", path);
            if status.is_server_error() {
                return Err(GatewayError::retryable(format!(
                    "CloudPayments API error ({})",
                    status
                )));
            }
            return Err(GatewayError::new(format!(
                "CloudPayments API error: {}",
                error_text
            )));
        }

        let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| {
            GatewayError::new(format!("Failed to parse CloudPayments response: {}", e))
        })?;

        if !envelope.success {
            return Err(GatewayError::new(format!(
                "CloudPayments rejected the request: {}",
                envelope.message.unwrap_or_default()
            )));
        }

        envelope
            .model
            .ok_or_else(|| GatewayError::new("CloudPayments response has no model"))
    }
}

#[async_trait]
impl BillingGateway for CloudPaymentsClient {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<GatewayInvoice, GatewayError> {
        let product = self
            .catalog
            .get_purchasable(&request.product_code)
            .map_err(|e| GatewayError::new(e.to_string()))?;

        // Self-assigned order id; it comes back in the webhook's InvoiceId
        // and is the ledger reference.
        let order_id = Uuid::new_v4().simple().to_string();

        let payload = serde_json::json!({
            "Amount": product.amount,
            "Currency": product.currency,
            "Description": product.description,
            "RequireConfirmation": false,
            "InvoiceId": order_id,
            "SubscriptionBehavior": if request.recurrent { "CreateMonthly" } else { "" },
            "SuccessRedirectUrl": self.config.success_redirect_url,
            "Email": request.email,
        });

        let model: OrderModel = self.post("/orders/create", payload).await?;

        Ok(GatewayInvoice {
            id: order_id,
            url: model.url,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let payload = serde_json::json!({ "Id": subscription_id });
        let model: SubscriptionModel = self.post("/subscriptions/get", payload).await?;

        let status = match model.status.to_lowercase().as_str() {
            "active" | "pastdue" => GatewaySubscriptionStatus::Active,
            "cancelled" | "rejected" | "expired" => GatewaySubscriptionStatus::Cancelled,
            _ => GatewaySubscriptionStatus::Unknown,
        };

        Ok(GatewaySubscription {
            id: model.id,
            status,
            checkout_session_id: None,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let payload = serde_json::json!({ "Id": subscription_id });
        // The cancel endpoint has an empty model; decode into Value.
        match self.post::<serde_json::Value>("/subscriptions/cancel", payload).await {
            Ok(_) => Ok(()),
            // Empty Model on success is normal for this endpoint.
            Err(err) if err.message.contains("no model") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn expire_checkout_session(&self, _session_id: &str) -> Result<(), GatewayError> {
        // Payment links expire server-side; nothing to do.
        Ok(())
    }
}
