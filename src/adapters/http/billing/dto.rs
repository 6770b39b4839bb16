//! Request/response DTOs for billing endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::billing::{Payment, PaymentStatus};
use crate::domain::providers::ProviderKind;

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub provider: ProviderKind,
    pub product_code: String,
    /// Anonymous payer's email.
    pub email: Option<String>,
    /// Authenticated payer's account id for a renewal.
    pub user_id: Option<Uuid>,
    /// Email of the person an invite product is bought for.
    pub invite_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Ledger reference of the started payment.
    pub reference: String,
    /// Where to send the payer.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct StopSubscriptionRequest {
    pub provider: ProviderKind,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub reference: String,
    pub product_code: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            reference: payment.reference,
            product_code: payment.product_code.as_str().to_string(),
            amount: payment.amount,
            status: payment.status,
            created_at: *payment.created_at.as_datetime(),
        }
    }
}
