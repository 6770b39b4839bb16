//! WayForPay-style webhook verification and request signing.
//!
//! Signatures are HMAC-MD5 over a semicolon-joined, strictly ordered subset
//! of fields. Unlike the other providers the signature is bidirectional:
//! inbound webhooks carry `merchantSignature`, and the service must also
//! *produce* signatures for outbound payment/invoice creation requests and
//! for the webhook acknowledgement body.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::billing::{EventKind, PaymentEvent, TransactionStatus};

use super::{constant_time_eq, ProviderKind, VerificationError, WebhookVerifier};

type HmacMd5 = Hmac<Md5>;

/// Field order for the purchase/invoice request signature. The order is
/// part of the protocol; joining in any other order produces a mismatch.
const REQUEST_SIGNATURE_FIELDS: [&str; 9] = [
    "merchantAccount",
    "merchantDomainName",
    "orderReference",
    "orderDate",
    "amount",
    "currency",
    "productName",
    "productCount",
    "productPrice",
];

/// Produces WayForPay request and acknowledgement signatures.
#[derive(Clone)]
pub struct WayForPaySigner {
    secret: SecretString,
}

impl WayForPaySigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
        }
    }

    /// HMAC-MD5 hex digest of `parts` joined with `;`.
    pub fn sign_parts(&self, parts: &[&str]) -> String {
        let joined = parts.join(";");
        let mut mac = HmacMd5::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(joined.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signature over the ordered request fields of `payload`.
    ///
    /// List-valued fields (product name/count/price) contribute their first
    /// element, matching the provider's canonicalization.
    pub fn sign_request(&self, payload: &serde_json::Value) -> Result<String, VerificationError> {
        let mut parts: Vec<String> = Vec::with_capacity(REQUEST_SIGNATURE_FIELDS.len());
        for field in REQUEST_SIGNATURE_FIELDS {
            let value = payload
                .get(field)
                .ok_or_else(|| VerificationError::Malformed(format!("missing field {field}")))?;
            let value = match value {
                serde_json::Value::Array(items) => items.first().cloned().ok_or_else(|| {
                    VerificationError::Malformed(format!("empty list field {field}"))
                })?,
                other => other.clone(),
            };
            parts.push(scalar_to_string(&value));
        }
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        Ok(self.sign_parts(&parts))
    }

    /// The signed acknowledgement the provider expects in the webhook
    /// response body: `{orderReference};accept;{time}`.
    pub fn acceptance_ack(&self, order_reference: &str, time: i64) -> WayForPayAck {
        let signature = self.sign_parts(&[order_reference, "accept", &time.to_string()]);
        WayForPayAck {
            order_reference: order_reference.to_string(),
            status: "accept".to_string(),
            time,
            signature,
        }
    }
}

/// Acknowledgement body returned to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WayForPayAck {
    #[serde(rename = "orderReference")]
    pub order_reference: String,
    pub status: String,
    pub time: i64,
    pub signature: String,
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Verifier for WayForPay-style webhooks.
pub struct WayForPayVerifier {
    signer: WayForPaySigner,
}

impl WayForPayVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            signer: WayForPaySigner::new(secret.into()),
        }
    }

    pub fn signer(&self) -> &WayForPaySigner {
        &self.signer
    }
}

impl WebhookVerifier for WayForPayVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::WayForPay
    }

    fn verify(
        &self,
        body: &[u8],
        _headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError> {
        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;

        let provided = raw
            .get("merchantSignature")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(VerificationError::MissingSignature)?;

        let expected = self.signer.sign_request(&raw)?;
        if !constant_time_eq(expected.as_bytes(), provided.to_lowercase().as_bytes()) {
            return Err(VerificationError::InvalidSignature);
        }

        let reference = raw
            .get("orderReference")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerificationError::Malformed("missing orderReference".into()))?
            .to_string();

        let status = match raw.get("transactionStatus").and_then(|v| v.as_str()) {
            Some("Approved") => TransactionStatus::Approved,
            Some("Refunded") => TransactionStatus::Refunded,
            _ => TransactionStatus::Pending,
        };

        Ok(PaymentEvent {
            provider: ProviderKind::WayForPay,
            kind: EventKind::CheckoutCompleted,
            reference,
            status,
            raw,
        })
    }
}
