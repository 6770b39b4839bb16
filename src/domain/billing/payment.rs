//! Payment aggregate: one row per payment attempt, keyed by reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::ProductCode;
use crate::domain::foundation::Timestamp;

/// Lifecycle status of a payment attempt.
///
/// `Started` transitions to exactly one of the terminal states; once
/// terminal the record never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Started,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Started => "started",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// A payment attempt to be recorded in the ledger.
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Provider-or-self-assigned reference; globally unique, the
    /// idempotency key for the whole reconciliation flow.
    pub reference: String,
    pub user_id: Option<Uuid>,
    pub product_code: ProductCode,
    pub amount: f64,
    pub status: PaymentStatus,
    /// Opaque provider payload kept for audit and replay.
    pub data: serde_json::Value,
}

impl NewPayment {
    /// A freshly started payment attempt.
    pub fn started(
        reference: impl Into<String>,
        user_id: Option<Uuid>,
        product_code: ProductCode,
        amount: f64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            reference: reference.into(),
            user_id,
            product_code,
            amount,
            status: PaymentStatus::Started,
            data,
        }
    }

    /// A payment recorded directly as successful (recurring charges and
    /// pre-paid invite funding arrive already settled).
    pub fn settled(
        reference: impl Into<String>,
        user_id: Option<Uuid>,
        product_code: ProductCode,
        amount: f64,
        data: serde_json::Value,
    ) -> Self {
        Self {
            reference: reference.into(),
            user_id,
            product_code,
            amount,
            status: PaymentStatus::Success,
            data,
        }
    }
}

/// A persisted payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Option<Uuid>,
    pub product_code: ProductCode,
    pub amount: f64,
    pub status: PaymentStatus,
    pub data: serde_json::Value,
    pub created_at: Timestamp,
}

impl Payment {
    /// Extracts the invited person's email from the provider payload.
    ///
    /// Checkout metadata lands under `metadata.invite` (card providers),
    /// inside the event envelope at `data.object.metadata.invite` when the
    /// payment was finalized from a raw webhook delivery, or as a top-level
    /// `invite` key (self-assigned payloads).
    pub fn invited_email(&self) -> Option<&str> {
        self.data
            .get("metadata")
            .and_then(|m| m.get("invite"))
            .or_else(|| self.data.pointer("/data/object/metadata/invite"))
            .or_else(|| self.data.get("invite"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
