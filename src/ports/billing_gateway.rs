//! Outbound billing gateway port.
//!
//! One implementation per provider REST API: creating checkout/payment
//! links and querying or cancelling recurring agreements. The crypto
//! provider has no outbound surface (its charge lifecycle is push-only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::ProductCode;

/// Errors from provider API calls.
///
/// Messages are safe to show to callers ("try again or contact support"
/// territory); raw provider faults stay in the logs.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

/// Request to open a checkout for a product.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub product_code: ProductCode,
    pub email: String,
    /// Reuse the provider customer record when we already know it.
    pub customer_id: Option<String>,
    pub recurrent: bool,
}

/// A created checkout/payment link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInvoice {
    /// Provider session/order id; becomes the ledger reference.
    pub id: String,
    /// URL the payer is sent to.
    pub url: String,
}

/// Provider-side view of a recurring agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewaySubscriptionStatus {
    Active,
    /// Initial payment never completed; an open checkout session may still
    /// be attached.
    Incomplete,
    Cancelled,
    Unknown,
}

/// Subscription details as reported by the provider.
#[derive(Debug, Clone)]
pub struct GatewaySubscription {
    pub id: String,
    pub status: GatewaySubscriptionStatus,
    /// Open checkout session tied to an incomplete agreement, if any.
    pub checkout_session_id: Option<String>,
}

/// Outbound calls to one provider's REST API.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Creates a checkout/payment link for the product.
    async fn create_checkout(&self, request: CheckoutRequest)
        -> Result<GatewayInvoice, GatewayError>;

    /// Queries a recurring agreement.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Cancels a recurring agreement. Cancelling an already-cancelled
    /// agreement is a success.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError>;

    /// Expires an open checkout session. Best effort; callers log failures
    /// and continue.
    async fn expire_checkout_session(&self, session_id: &str) -> Result<(), GatewayError>;
}
