//! Canonical, provider-agnostic webhook event.
//!
//! Every webhook verifier outputs this shape, decoupling the activation
//! engine from provider-specific payloads. The raw payload is preserved for
//! the audit trail.

use serde::{Deserialize, Serialize};

use crate::domain::providers::ProviderKind;

/// Canonical transaction status across all providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Refunded,
    Unknown,
}

/// What the webhook is telling us happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A checkout session finished; the reference is the session/invoice id.
    CheckoutCompleted,
    /// A recurring invoice was paid.
    InvoicePaid,
    /// A crypto charge was opened.
    ChargeCreated,
    /// A crypto charge was confirmed on-chain.
    ChargeConfirmed,
    /// A crypto charge failed.
    ChargeFailed,
    /// A crypto charge is awaiting confirmations.
    ChargePending,
    /// The provider cancelled a recurring agreement.
    SubscriptionCancelled,
    /// The provider created or updated a customer record.
    CustomerUpdated,
    /// Anything we do not handle; acknowledged or rejected at the boundary.
    Other(String),
}

/// Verified, canonical payment event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Which provider adapter produced this event.
    pub provider: ProviderKind,

    /// Canonical event kind.
    pub kind: EventKind,

    /// The idempotency reference: session id, invoice id, or charge code.
    pub reference: String,

    /// Canonical transaction status.
    pub status: TransactionStatus,

    /// Original provider payload, stored verbatim for audit and replay.
    pub raw: serde_json::Value,
}

impl PaymentEvent {
    /// Digs a string field out of the raw payload by a `/`-separated path.
    pub fn raw_str(&self, path: &str) -> Option<&str> {
        let mut node = &self.raw;
        for key in path.split('/') {
            node = node.get(key)?;
        }
        node.as_str()
    }
}
