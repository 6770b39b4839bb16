//! CloudPayments-style webhook verification.
//!
//! The provider posts form-encoded bodies and signs each request with
//! base64(HMAC-SHA256(body)) in the `Content-HMAC` header. The webhook
//! action (`pay`, `fail`, `recurrent`) travels in the query string.

use std::collections::HashMap;

use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::domain::billing::{EventKind, PaymentEvent, TransactionStatus};

use super::{constant_time_eq, ProviderKind, VerificationError, WebhookVerifier};

type HmacSha256 = Hmac<Sha256>;

/// Verifier for CloudPayments-style card webhooks.
pub struct CloudPaymentsVerifier {
    api_secret: SecretString,
}

impl CloudPaymentsVerifier {
    pub fn new(api_secret: impl Into<String>) -> Self {
        Self {
            api_secret: SecretString::new(api_secret.into()),
        }
    }

    fn compute_signature(&self, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn canonicalize(
        &self,
        action: &str,
        fields: HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError> {
        let raw = serde_json::Map::from_iter(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))),
        );
        let raw = serde_json::Value::Object(raw);

        let invoice_id = fields.get("InvoiceId").filter(|s| !s.is_empty());
        let subscription_id = fields.get("SubscriptionId").filter(|s| !s.is_empty());

        let (kind, status, reference) = match action {
            "pay" => {
                let reference = invoice_id
                    .or(subscription_id)
                    .ok_or_else(|| {
                        VerificationError::Malformed("pay without InvoiceId or SubscriptionId".into())
                    })?
                    .clone();
                let kind = if invoice_id.is_some() {
                    EventKind::CheckoutCompleted
                } else {
                    EventKind::InvoicePaid
                };
                (kind, TransactionStatus::Approved, reference)
            }
            "recurrent" if fields.get("Status").map(String::as_str) == Some("Cancelled") => {
                let reference = fields
                    .get("Id")
                    .cloned()
                    .ok_or_else(|| VerificationError::Malformed("recurrent without Id".into()))?;
                (EventKind::SubscriptionCancelled, TransactionStatus::Unknown, reference)
            }
            "fail" => {
                let reference = invoice_id
                    .or(subscription_id)
                    .cloned()
                    .unwrap_or_default();
                (EventKind::ChargeFailed, TransactionStatus::Unknown, reference)
            }
            other => (
                EventKind::Other(other.to_string()),
                TransactionStatus::Unknown,
                invoice_id.cloned().unwrap_or_default(),
            ),
        };

        Ok(PaymentEvent {
            provider: ProviderKind::CloudPayments,
            kind,
            reference,
            status,
            raw,
        })
    }
}

impl WebhookVerifier for CloudPaymentsVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::CloudPayments
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Result<PaymentEvent, VerificationError> {
        let header = headers
            .get("content-hmac")
            .filter(|s| !s.is_empty())
            .ok_or(VerificationError::MissingSignature)?;

        let expected = self.compute_signature(body);
        if !constant_time_eq(expected.as_bytes(), header.as_bytes()) {
            return Err(VerificationError::InvalidSignature);
        }

        let action = query
            .get("action")
            .ok_or_else(|| VerificationError::Malformed("missing action".into()))?;
        self.canonicalize(action, parse_form_body(body))
    }
}

/// Decodes an `application/x-www-form-urlencoded` body. Later duplicates of
/// a key win, matching what the provider sends in practice (no duplicates).
fn parse_form_body(body: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(body).into_owned().collect()
}
