//! WayForPay REST API client.
//!
//! Offline payment link creation against the `pay` endpoint and invoice
//! creation against the merchant API. Outbound payloads carry the same
//! HMAC-MD5 signature scheme the inbound webhook uses, so signing is
//! delegated to [`WayForPaySigner`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::domain::catalog::{Catalog, Recurrence};
use crate::domain::providers::WayForPaySigner;
use crate::ports::{
    BillingGateway, CheckoutRequest, GatewayError, GatewayInvoice, GatewaySubscription,
    GatewaySubscriptionStatus,
};

/// WayForPay merchant configuration.
#[derive(Clone)]
pub struct WayForPayClientConfig {
    pub merchant_account: String,
    pub merchant_domain: String,
    /// Webhook URL the processor posts payment results to.
    pub service_url: String,
    pub pay_base_url: String,
    pub api_base_url: String,
}

impl WayForPayClientConfig {
    pub fn new(
        merchant_account: impl Into<String>,
        merchant_domain: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            merchant_account: merchant_account.into(),
            merchant_domain: merchant_domain.into(),
            service_url: service_url.into(),
            pay_base_url: "https://secure.wayforpay.com".to_string(),
            api_base_url: "https://api.wayforpay.com".to_string(),
        }
    }

    /// Set custom base URLs (for testing).
    pub fn with_base_urls(mut self, pay: impl Into<String>, api: impl Into<String>) -> Self {
        self.pay_base_url = pay.into();
        self.api_base_url = api.into();
        self
    }
}

pub struct WayForPayClient {
    config: WayForPayClientConfig,
    signer: WayForPaySigner,
    catalog: Arc<Catalog>,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PayResponse {
    url: String,
}

impl WayForPayClient {
    pub fn new(
        config: WayForPayClientConfig,
        signer: WayForPaySigner,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            config,
            signer,
            catalog,
            http_client: reqwest::Client::new(),
        }
    }

    fn signed_order_payload(
        &self,
        request: &CheckoutRequest,
    ) -> Result<(String, serde_json::Value), GatewayError> {
        let product = self
            .catalog
            .get_purchasable(&request.product_code)
            .map_err(|e| GatewayError::new(e.to_string()))?;

        let order_id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut payload = serde_json::json!({
            "merchantAccount": self.config.merchant_account,
            "merchantDomainName": self.config.merchant_domain,
            "serviceUrl": self.config.service_url,
            "orderReference": order_id,
            "orderDate": now.timestamp(),
            "amount": product.amount,
            "currency": product.currency,
            "productName": [product.description],
            "productPrice": [product.amount],
            "productCount": [1],
        });

        if request.recurrent {
            let mode = match product.recurrence {
                Recurrence::Yearly => "yearly",
                _ => "monthly",
            };
            let date_next = (now + product.duration).format("%d.%m.%Y").to_string();
            payload["regularMode"] = serde_json::json!(mode);
            payload["regularOn"] = serde_json::json!(1);
            payload["dateNext"] = serde_json::json!(date_next);
            payload["dateEnd"] = serde_json::json!("01.01.2100");
        } else {
            payload["regularMode"] = serde_json::json!("client");
        }

        let signature = self
            .signer
            .sign_request(&payload)
            .map_err(|e| GatewayError::new(format!("Failed to sign order: {}", e)))?;
        payload["merchantSignature"] = serde_json::json!(signature);

        Ok((order_id, payload))
    }

    async fn post_order(
        &self,
        url: String,
        order_id: String,
        payload: serde_json::Value,
    ) -> Result<GatewayInvoice, GatewayError> {
        let response = self
            .http_client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("WayForPay request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "WayForPay order creation failed");
            if status.is_server_error() {
                return Err(GatewayError::retryable(format!("WayForPay API error ({})", status)));
            }
            return Err(GatewayError::new(format!("WayForPay API error: {}", error_text)));
        }

        let pay: PayResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::new(format!("Failed to parse WayForPay response: {}", e)))?;

        Ok(GatewayInvoice {
            id: order_id,
            url: pay.url,
        })
    }
}

#[async_trait]
impl BillingGateway for WayForPayClient {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<GatewayInvoice, GatewayError> {
        let (order_id, payload) = self.signed_order_payload(&request)?;
        let url = format!("{}/pay?behavior=offline", self.config.pay_base_url);
        self.post_order(url, order_id, payload).await
    }

    async fn get_subscription(
        &self,
        _subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        // The merchant API exposes no single-agreement lookup; cancellation
        // decisions are made from our local mirror.
        Err(GatewayError::new(
            "WayForPay does not support subscription lookup",
        ))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let payload = serde_json::json!({
            "requestType": "REMOVE",
            "merchantAccount": self.config.merchant_account,
            "orderReference": subscription_id,
            "merchantSignature": self.signer.sign_parts(&[
                "REMOVE",
                &self.config.merchant_account,
                subscription_id,
            ]),
        });

        let response = self
            .http_client
            .post(format!("{}/regularApi", self.config.api_base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::retryable(format!("WayForPay request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(error = %error_text, "WayForPay subscription removal failed");
            return Err(GatewayError::new(format!("WayForPay API error: {}", error_text)));
        }

        Ok(())
    }

    async fn expire_checkout_session(&self, _session_id: &str) -> Result<(), GatewayError> {
        // Payment links expire via orderTimeout; nothing to do.
        Ok(())
    }
}
