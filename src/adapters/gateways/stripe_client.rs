//! Stripe REST API client.
//!
//! Checkout sessions for one-off and recurring purchases, subscription
//! lookup and cancellation, and best-effort expiry of abandoned sessions.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::error;

use crate::domain::catalog::Catalog;
use crate::domain::providers::ProviderKind;
use crate::ports::{
    BillingGateway, CheckoutRequest, GatewayError, GatewayInvoice, GatewaySubscription,
    GatewaySubscriptionStatus,
};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeClientConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    pub api_key: SecretString,
    /// Base URL for the Stripe API.
    pub api_base_url: String,
    /// Where the payer lands after a completed checkout.
    pub success_url: String,
    /// Where the payer lands after abandoning checkout.
    pub cancel_url: String,
}

impl StripeClientConfig {
    pub fn new(api_key: impl Into<String>, success_url: impl Into<String>, cancel_url: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct StripeClient {
    config: StripeClientConfig,
    catalog: Arc<Catalog>,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
    latest_invoice: Option<serde_json::Value>,
}

impl StripeClient {
    pub fn new(config: StripeClientConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            config,
            catalog,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn check_response(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "Stripe {} failed", what);
            if status.is_server_error() {
                return Err(GatewayError::retryable(format!("Stripe API error ({})", status)));
            }
            return Err(GatewayError::new(format!("Stripe API error: {}", error_text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BillingGateway for StripeClient {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<GatewayInvoice, GatewayError> {
        let product = self
            .catalog
            .get_purchasable(&request.product_code)
            .map_err(|e| GatewayError::new(e.to_string()))?;
        let price_id = product
            .price_ids
            .get(&ProviderKind::Stripe)
            .ok_or_else(|| {
                GatewayError::new(format!("Product {} has no Stripe price", product.code))
            })?;

        let mode = if request.recurrent { "subscription" } else { "payment" };
        let mut params = vec![
            ("mode", mode.to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
        ];

        // Reusing the customer record keeps all agreements under one
        // stripe customer so they can be cancelled together.
        match &request.customer_id {
            Some(customer_id) => params.push(("customer", customer_id.clone())),
            None => params.push(("customer_email", request.email.clone())),
        }

        let response = self
            .http_client
            .post(self.url("/v1/checkout/sessions"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("Stripe request failed: {}", e)))?;

        let response = self.check_response(response, "create_checkout").await?;
        let session: StripeCheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::new(format!("Failed to parse Stripe response: {}", e)))?;

        let url = session
            .url
            .ok_or_else(|| GatewayError::new("Checkout session has no redirect URL"))?;

        Ok(GatewayInvoice { id: session.id, url })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&[("expand[]", "latest_invoice")])
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("Stripe request failed: {}", e)))?;

        let response = self.check_response(response, "get_subscription").await?;
        let subscription: StripeSubscription = response
            .json()
            .await
            .map_err(|e| GatewayError::new(format!("Failed to parse Stripe response: {}", e)))?;

        let status = match subscription.status.as_str() {
            "active" | "trialing" | "past_due" => GatewaySubscriptionStatus::Active,
            "incomplete" | "incomplete_expired" => GatewaySubscriptionStatus::Incomplete,
            "canceled" | "unpaid" => GatewaySubscriptionStatus::Cancelled,
            _ => GatewaySubscriptionStatus::Unknown,
        };

        // An incomplete agreement may still have an open checkout session
        // hanging off its first invoice.
        let checkout_session_id = subscription
            .latest_invoice
            .as_ref()
            .and_then(|invoice| invoice.get("checkout_session"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(GatewaySubscription {
            id: subscription.id,
            status,
            checkout_session_id,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("Stripe request failed: {}", e)))?;

        // Cancelling twice answers 404; that is the outcome we wanted.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        self.check_response(response, "cancel_subscription").await?;
        Ok(())
    }

    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), GatewayError> {
        let response = self
            .http_client
            .post(self.url(&format!("/v1/checkout/sessions/{}/expire", session_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("Stripe request failed: {}", e)))?;

        self.check_response(response, "expire_checkout_session").await?;
        Ok(())
    }
}
