//! Local mirror of a recurring billing agreement.
//!
//! Created on the first recurring payment, flipped to `Stopped` by a
//! cancellation webhook or an explicit stop request. Rows are never deleted;
//! they are part of the audit trail.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::ProductCode;
use crate::domain::foundation::Timestamp;

/// Status of a recurring agreement as we last saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Stopped,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Stopped => "stopped",
        }
    }
}

/// A recurring agreement to be recorded.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// The provider's subscription id.
    pub subscription_id: String,
    pub user_id: Uuid,
    pub product_code: ProductCode,
    pub amount: f64,
    /// Ledger reference of the payment that opened the agreement; recurring
    /// charges without their own invoice id are booked against it.
    pub reference: String,
    pub data: serde_json::Value,
}

/// A persisted recurring agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscription_id: String,
    pub user_id: Uuid,
    pub product_code: ProductCode,
    pub amount: f64,
    pub reference: String,
    pub status: SubscriptionStatus,
    pub created_at: Timestamp,
}
