//! Webhook verifiers, one per payment processor.
//!
//! Each verifier turns a raw HTTP request (body, headers, query) into a
//! verified canonical [`PaymentEvent`](crate::domain::billing::PaymentEvent)
//! or rejects it with no partial state change. An empty or missing
//! signature is an automatic rejection.

mod cloudpayments;
mod coinbase;
mod stripe;
mod wayforpay;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::billing::PaymentEvent;

pub use cloudpayments::CloudPaymentsVerifier;
pub use coinbase::CoinbaseVerifier;
pub use stripe::StripeVerifier;
pub use wayforpay::{WayForPayAck, WayForPaySigner, WayForPayVerifier};

/// The payment processors we accept webhooks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Stripe,
    /// Secondary card-checkout endpoint kept for the retired flow; same
    /// wire protocol as `Stripe` with its own signing secret.
    StripeLegacy,
    CloudPayments,
    WayForPay,
    Coinbase,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::Stripe => "stripe",
            ProviderKind::StripeLegacy => "stripe_legacy",
            ProviderKind::CloudPayments => "cloudpayments",
            ProviderKind::WayForPay => "wayforpay",
            ProviderKind::Coinbase => "coinbase",
        };
        write!(f, "{}", s)
    }
}

/// Rejection reasons for inbound webhooks.
///
/// All variants mean "no state was changed"; the HTTP layer answers 4xx.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Missing or empty signature")]
    MissingSignature,

    #[error("Signature mismatch")]
    InvalidSignature,

    #[error("Event timestamp outside the accepted window")]
    StaleTimestamp,

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// One adapter per provider: authenticates a raw request and produces the
/// canonical event.
pub trait WebhookVerifier: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn verify(
        &self,
        body: &[u8],
        headers: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError>;
}

/// Constant-time comparison of two byte slices.
///
/// Length is not secret; contents are.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
