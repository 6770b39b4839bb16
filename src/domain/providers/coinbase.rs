//! Coinbase-style crypto-charge webhook verification.
//!
//! HMAC-SHA256 hex digest of the raw body, carried in the
//! `X-CC-Webhook-Signature` header. The provider's dashboard shows the
//! digest uppercased, so comparison is case-insensitive: both sides are
//! decoded to bytes before the constant-time compare.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::domain::billing::{EventKind, PaymentEvent, TransactionStatus};

use super::{constant_time_eq, ProviderKind, VerificationError, WebhookVerifier};

type HmacSha256 = Hmac<Sha256>;

/// Verifier for crypto-charge webhooks. Charge lifecycle is push-only:
/// there is no outbound API surface for this provider.
pub struct CoinbaseVerifier {
    secret: SecretString,
}

impl CoinbaseVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
        }
    }

    fn compute_signature(&self, body: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

impl WebhookVerifier for CoinbaseVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Coinbase
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError> {
        if body.is_empty() {
            return Err(VerificationError::Malformed("empty body".into()));
        }

        let header = headers
            .get("x-cc-webhook-signature")
            .filter(|s| !s.is_empty())
            .ok_or(VerificationError::MissingSignature)?;

        // Decoding lowercases implicitly, making the compare case-insensitive.
        let provided = hex::decode(header.to_lowercase())
            .map_err(|_| VerificationError::InvalidSignature)?;
        if !constant_time_eq(&self.compute_signature(body), &provided) {
            return Err(VerificationError::InvalidSignature);
        }

        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|_| VerificationError::Malformed("payload is not json".into()))?;

        let event = raw
            .get("event")
            .ok_or_else(|| VerificationError::Malformed("missing event".into()))?;
        let event_type = event
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerificationError::Malformed("missing event type".into()))?;
        let reference = event
            .get("data")
            .and_then(|d| d.get("code"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerificationError::Malformed("missing charge code".into()))?
            .to_string();

        let (kind, status) = match event_type {
            "charge:created" => (EventKind::ChargeCreated, TransactionStatus::Pending),
            "charge:confirmed" => (EventKind::ChargeConfirmed, TransactionStatus::Approved),
            "charge:failed" => (EventKind::ChargeFailed, TransactionStatus::Unknown),
            "charge:pending" => (EventKind::ChargePending, TransactionStatus::Pending),
            other => (EventKind::Other(other.to_string()), TransactionStatus::Unknown),
        };

        Ok(PaymentEvent {
            provider: ProviderKind::Coinbase,
            kind,
            reference,
            status,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "coinbase_shared_secret";

    fn charge_body(event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": {
                "type": event_type,
                "data": {
                    "code": "CHARGE-42",
                    "metadata": { "email": "payer@example.com" },
                    "checkout": { "id": "checkout_club1" }
                }
            }
        }))
        .unwrap()
    }

    fn signed_headers(body: &[u8]) -> HashMap<String, String> {
        let mut mac = HmacSha256::new_from_slice(TEST_SECRET.as_bytes()).unwrap();
        mac.update(body);
        HashMap::from([(
            "x-cc-webhook-signature".to_string(),
            hex::encode(mac.finalize().into_bytes()),
        )])
    }

    #[test]
    fn confirmed_charge_is_approved() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);
        let body = charge_body("charge:confirmed");

        let event = verifier.verify(&body, &signed_headers(&body), &HashMap::new()).unwrap();

        assert_eq!(event.kind, EventKind::ChargeConfirmed);
        assert_eq!(event.status, TransactionStatus::Approved);
        assert_eq!(event.reference, "CHARGE-42");
        assert_eq!(event.raw_str("event/data/metadata/email"), Some("payer@example.com"));
    }

    #[test]
    fn uppercase_signature_header_is_accepted() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);
        let body = charge_body("charge:created");
        let mut headers = signed_headers(&body);
        let upper = headers["x-cc-webhook-signature"].to_uppercase();
        headers.insert("x-cc-webhook-signature".to_string(), upper);

        let event = verifier.verify(&body, &headers, &HashMap::new()).unwrap();
        assert_eq!(event.kind, EventKind::ChargeCreated);
    }

    #[test]
    fn flipped_byte_is_rejected() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);
        let body = charge_body("charge:confirmed");
        let headers = signed_headers(&body);
        let mut tampered = body.clone();
        tampered[10] ^= 0x01;

        let result = verifier.verify(&tampered, &headers, &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::InvalidSignature);
    }

    #[test]
    fn missing_signature_is_rejected() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);
        let body = charge_body("charge:confirmed");

        let result = verifier.verify(&body, &HashMap::new(), &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::MissingSignature);
    }

    #[test]
    fn empty_body_is_rejected() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);
        let result = verifier.verify(b"", &signed_headers(b"x"), &HashMap::new());
        assert!(matches!(result.unwrap_err(), VerificationError::Malformed(_)));
    }

    #[test]
    fn failed_and_pending_charges_canonicalize() {
        let verifier = CoinbaseVerifier::new(TEST_SECRET);

        let body = charge_body("charge:failed");
        let event = verifier.verify(&body, &signed_headers(&body), &HashMap::new()).unwrap();
        assert_eq!(event.kind, EventKind::ChargeFailed);

        let body = charge_body("charge:pending");
        let event = verifier.verify(&body, &signed_headers(&body), &HashMap::new()).unwrap();
        assert_eq!(event.kind, EventKind::ChargePending);
        assert_eq!(event.status, TransactionStatus::Pending);
    }
}
