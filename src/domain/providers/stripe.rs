//! Stripe-style webhook verification.
//!
//! HMAC-SHA256 over `"{timestamp}.{body}"` with the endpoint's signing
//! secret, carried in the `Stripe-Signature` header as `t=..,v1=..`.
//! Timestamps outside a five-minute window are rejected to blunt replays.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::domain::billing::{EventKind, PaymentEvent, TransactionStatus};

use super::{constant_time_eq, ProviderKind, VerificationError, WebhookVerifier};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the `Stripe-Signature` header.
///
/// Format: `t=<timestamp>,v1=<signature>[,v0=<legacy>]`; unknown fields are
/// ignored for forward compatibility.
#[derive(Debug, Clone)]
struct SignatureHeader {
    timestamp: i64,
    v1_signature: Vec<u8>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, VerificationError> {
        if header.is_empty() {
            return Err(VerificationError::MissingSignature);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                return Err(VerificationError::Malformed("invalid signature header".into()));
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        VerificationError::Malformed("invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value.trim()).map_err(|_| {
                        VerificationError::Malformed("invalid v1 signature hex".into())
                    })?);
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp
                .ok_or_else(|| VerificationError::Malformed("missing timestamp".into()))?,
            v1_signature: v1_signature.ok_or(VerificationError::MissingSignature)?,
        })
    }
}

/// Verifier for Stripe-style card-checkout webhooks.
///
/// Instantiated twice in production: the main endpoint and the legacy
/// secondary endpoint, each with its own signing secret.
pub struct StripeVerifier {
    provider: ProviderKind,
    secret: SecretString,
}

impl StripeVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Stripe,
            secret: SecretString::new(secret.into()),
        }
    }

    /// The legacy secondary endpoint, same wire protocol, separate secret.
    pub fn legacy(secret: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::StripeLegacy,
            secret: SecretString::new(secret.into()),
        }
    }

    fn validate_timestamp(&self, timestamp: i64, now: i64) -> Result<(), VerificationError> {
        let age = now - timestamp;
        if age > MAX_EVENT_AGE_SECS || age < -MAX_CLOCK_SKEW_SECS {
            return Err(VerificationError::StaleTimestamp);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, body: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    fn canonicalize(&self, raw: serde_json::Value) -> Result<PaymentEvent, VerificationError> {
        let event_type = raw
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerificationError::Malformed("missing event type".into()))?;
        let object = raw
            .get("data")
            .and_then(|d| d.get("object"))
            .ok_or_else(|| VerificationError::Malformed("missing data.object".into()))?;
        let object_id = object.get("id").and_then(|v| v.as_str()).unwrap_or_default();

        let (kind, status) = match event_type {
            "checkout.session.completed" => {
                (EventKind::CheckoutCompleted, TransactionStatus::Approved)
            }
            "invoice.paid" => (EventKind::InvoicePaid, TransactionStatus::Approved),
            "customer.created" | "customer.updated" => {
                (EventKind::CustomerUpdated, TransactionStatus::Unknown)
            }
            other => (EventKind::Other(other.to_string()), TransactionStatus::Unknown),
        };

        Ok(PaymentEvent {
            provider: self.provider,
            kind,
            reference: object_id.to_string(),
            status,
            raw,
        })
    }
}

impl WebhookVerifier for StripeVerifier {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError> {
        let header = headers
            .get("stripe-signature")
            .ok_or(VerificationError::MissingSignature)?;
        let header = SignatureHeader::parse(header)?;

        self.validate_timestamp(header.timestamp, chrono::Utc::now().timestamp())?;

        let expected = self.compute_signature(header.timestamp, body);
        if !constant_time_eq(&expected, &header.v1_signature) {
            return Err(VerificationError::InvalidSignature);
        }

        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        self.canonicalize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn headers_for(secret: &str, body: &str) -> HashMap<String, String> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign(secret, timestamp, body);
        HashMap::from([(
            "stripe-signature".to_string(),
            format!("t={timestamp},v1={signature}"),
        )])
    }

    #[test]
    fn valid_signature_yields_canonical_event() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_test_123"}}}"#;

        let event = verifier
            .verify(body.as_bytes(), &headers_for(TEST_SECRET, body), &HashMap::new())
            .unwrap();

        assert_eq!(event.kind, EventKind::CheckoutCompleted);
        assert_eq!(event.status, TransactionStatus::Approved);
        assert_eq!(event.reference, "cs_test_123");
        assert_eq!(event.provider, ProviderKind::Stripe);
    }

    #[test]
    fn invoice_paid_maps_to_invoice_kind() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"type":"invoice.paid","data":{"object":{"id":"in_42"}}}"#;

        let event = verifier
            .verify(body.as_bytes(), &headers_for(TEST_SECRET, body), &HashMap::new())
            .unwrap();

        assert_eq!(event.kind, EventKind::InvoicePaid);
        assert_eq!(event.reference, "in_42");
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"type":"invoice.paid","data":{"object":{"id":"in_42"}}}"#;
        let headers = headers_for(TEST_SECRET, body);
        let tampered = body.replace("in_42", "in_43");

        let result = verifier.verify(tampered.as_bytes(), &headers, &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::InvalidSignature);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = StripeVerifier::new("whsec_other");
        let body = r#"{"type":"invoice.paid","data":{"object":{"id":"in_42"}}}"#;

        let result =
            verifier.verify(body.as_bytes(), &headers_for(TEST_SECRET, body), &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::InvalidSignature);
    }

    #[test]
    fn missing_header_is_rejected() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let result = verifier.verify(b"{}", &HashMap::new(), &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::MissingSignature);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"type":"invoice.paid","data":{"object":{"id":"in_42"}}}"#;
        let timestamp = chrono::Utc::now().timestamp() - 600;
        let signature = sign(TEST_SECRET, timestamp, body);
        let headers = HashMap::from([(
            "stripe-signature".to_string(),
            format!("t={timestamp},v1={signature}"),
        )]);

        let result = verifier.verify(body.as_bytes(), &headers, &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::StaleTimestamp);
    }

    #[test]
    fn future_timestamp_beyond_skew_is_rejected() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"type":"invoice.paid","data":{"object":{"id":"in_42"}}}"#;
        let timestamp = chrono::Utc::now().timestamp() + 120;
        let signature = sign(TEST_SECRET, timestamp, body);
        let headers = HashMap::from([(
            "stripe-signature".to_string(),
            format!("t={timestamp},v1={signature}"),
        )]);

        let result = verifier.verify(body.as_bytes(), &headers, &HashMap::new());
        assert_eq!(result.unwrap_err(), VerificationError::StaleTimestamp);
    }

    #[test]
    fn unknown_event_types_pass_through_as_other() {
        let verifier = StripeVerifier::new(TEST_SECRET);
        let body = r#"{"type":"charge.refunded","data":{"object":{"id":"ch_9"}}}"#;

        let event = verifier
            .verify(body.as_bytes(), &headers_for(TEST_SECRET, body), &HashMap::new())
            .unwrap();

        assert_eq!(event.kind, EventKind::Other("charge.refunded".to_string()));
        assert_eq!(event.status, TransactionStatus::Unknown);
    }

    #[test]
    fn legacy_instance_reports_its_own_provider() {
        let verifier = StripeVerifier::legacy(TEST_SECRET);
        assert_eq!(verifier.provider(), ProviderKind::StripeLegacy);
    }
}
