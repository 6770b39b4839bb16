//! HTTP handlers for provider webhooks.
//!
//! Each processor expects its own acknowledgement dialect, down to exact
//! response bodies; retries hinge on them, so the bodies here are part of
//! the wire contract and must not be "improved".
//!
//! Duplicate deliveries never reach this layer as errors: the event
//! processor collapses them into a normal outcome and the provider gets
//! its success acknowledgement with no re-activation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::application::handlers::billing::{ProcessEventError, ProcessPaymentEventHandler};
use crate::domain::providers::{
    CloudPaymentsVerifier, CoinbaseVerifier, ProviderKind, StripeVerifier, VerificationError,
    WayForPayVerifier, WebhookVerifier,
};

/// Webhook state: the event processor plus one verifier per configured
/// provider. Endpoints for absent providers answer 404.
#[derive(Clone)]
pub struct WebhookHandlers {
    process_handler: Arc<ProcessPaymentEventHandler>,
    stripe: Option<Arc<StripeVerifier>>,
    stripe_legacy: Option<Arc<StripeVerifier>>,
    cloudpayments: Option<Arc<CloudPaymentsVerifier>>,
    wayforpay: Option<Arc<WayForPayVerifier>>,
    coinbase: Option<Arc<CoinbaseVerifier>>,
}

impl WebhookHandlers {
    pub fn new(process_handler: Arc<ProcessPaymentEventHandler>) -> Self {
        Self {
            process_handler,
            stripe: None,
            stripe_legacy: None,
            cloudpayments: None,
            wayforpay: None,
            coinbase: None,
        }
    }

    pub fn with_stripe(mut self, verifier: Arc<StripeVerifier>) -> Self {
        self.stripe = Some(verifier);
        self
    }

    pub fn with_stripe_legacy(mut self, verifier: Arc<StripeVerifier>) -> Self {
        self.stripe_legacy = Some(verifier);
        self
    }

    pub fn with_cloudpayments(mut self, verifier: Arc<CloudPaymentsVerifier>) -> Self {
        self.cloudpayments = Some(verifier);
        self
    }

    pub fn with_wayforpay(mut self, verifier: Arc<WayForPayVerifier>) -> Self {
        self.wayforpay = Some(verifier);
        self
    }

    pub fn with_coinbase(mut self, verifier: Arc<CoinbaseVerifier>) -> Self {
        self.coinbase = Some(verifier);
        self
    }
}

fn not_configured() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// Stripe-protocol endpoints
// ════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(handlers): State<WebhookHandlers>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = handlers.stripe.clone() else {
        return not_configured();
    };
    stripe_protocol(&handlers, &verifier, &headers, &body).await
}

/// POST /webhooks/stripe/legacy
pub async fn stripe_legacy_webhook(
    State(handlers): State<WebhookHandlers>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = handlers.stripe_legacy.clone() else {
        return not_configured();
    };
    stripe_protocol(&handlers, &verifier, &headers, &body).await
}

async fn stripe_protocol(
    handlers: &WebhookHandlers,
    verifier: &StripeVerifier,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let event = match verifier.verify(body, &header_map(headers), &HashMap::new()) {
        Ok(event) => event,
        Err(VerificationError::Malformed(reason)) => {
            warn!(provider = %verifier.provider(), %reason, "malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "[invalid payload]").into_response();
        }
        Err(err) => {
            warn!(provider = %verifier.provider(), error = %err, "webhook rejected");
            return (StatusCode::BAD_REQUEST, "[invalid signature]").into_response();
        }
    };

    match handlers.process_handler.handle(event).await {
        Ok(_) => (StatusCode::OK, "[ok]").into_response(),
        Err(ProcessEventError::PaymentNotFound(_)) => {
            (StatusCode::BAD_REQUEST, "[payment not found]").into_response()
        }
        Err(ProcessEventError::UnknownEvent(_)) => {
            (StatusCode::BAD_REQUEST, "[unknown event]").into_response()
        }
        Err(err) => internal_error(verifier.provider(), err),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CloudPayments
// ════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/cloudpayments?action=..
///
/// The provider treats any JSON answer with `code: 0` as accepted and
/// retries on everything else.
pub async fn cloudpayments_webhook(
    State(handlers): State<WebhookHandlers>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = &handlers.cloudpayments else {
        return not_configured();
    };
    let event = match verifier.verify(&body, &header_map(&headers), &query) {
        Ok(event) => event,
        Err(err) => {
            warn!(provider = "cloudpayments", error = %err, "webhook rejected");
            return (StatusCode::BAD_REQUEST, "Request is not verified").into_response();
        }
    };

    match handlers.process_handler.handle(event).await {
        Ok(_) => Json(serde_json::json!({ "code": 0 })).into_response(),
        Err(
            err @ (ProcessEventError::PaymentNotFound(_)
            | ProcessEventError::SubscriptionNotFound(_)
            | ProcessEventError::ProductNotFound
            | ProcessEventError::UserNotFound
            | ProcessEventError::UnknownEvent(_)
            | ProcessEventError::Malformed(_)),
        ) => {
            warn!(provider = "cloudpayments", error = %err, "payment cannot be accepted");
            // Code 13 is the protocol's "payment cannot be accepted".
            (StatusCode::OK, Json(serde_json::json!({ "code": 13 }))).into_response()
        }
        Err(err) => internal_error(ProviderKind::CloudPayments, err),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// WayForPay
// ════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/wayforpay
///
/// The acknowledgement is itself signed: `{orderReference, status: accept,
/// time, signature}`. Anything unsigned is re-delivered.
pub async fn wayforpay_webhook(
    State(handlers): State<WebhookHandlers>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = &handlers.wayforpay else {
        return not_configured();
    };
    let event = match verifier.verify(&body, &header_map(&headers), &HashMap::new()) {
        Ok(event) => event,
        Err(err) => {
            warn!(provider = "wayforpay", error = %err, "webhook rejected");
            return (StatusCode::BAD_REQUEST, "signature mismatch").into_response();
        }
    };

    let reference = event.reference.clone();
    match handlers.process_handler.handle(event).await {
        Ok(_) => {
            let ack = verifier
                .signer()
                .acceptance_ack(&reference, chrono::Utc::now().timestamp());
            Json(ack).into_response()
        }
        Err(ProcessEventError::PaymentNotFound(_)) => {
            (StatusCode::BAD_REQUEST, "payment not found").into_response()
        }
        Err(err) => internal_error(ProviderKind::WayForPay, err),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Coinbase Commerce
// ════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/coinbase
pub async fn coinbase_webhook(
    State(handlers): State<WebhookHandlers>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = &handlers.coinbase else {
        return not_configured();
    };
    let event = match verifier.verify(&body, &header_map(&headers), &HashMap::new()) {
        Ok(event) => event,
        Err(VerificationError::Malformed(reason)) => {
            warn!(provider = "coinbase", %reason, "malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "[invalid payload]").into_response();
        }
        Err(err) => {
            warn!(provider = "coinbase", error = %err, "webhook rejected");
            return (StatusCode::BAD_REQUEST, "[invalid signature]").into_response();
        }
    };

    match handlers.process_handler.handle(event).await {
        Ok(_) => (StatusCode::OK, "[ok]").into_response(),
        Err(ProcessEventError::PaymentNotFound(_)) => {
            (StatusCode::BAD_REQUEST, "[payment not found]").into_response()
        }
        Err(ProcessEventError::UnknownEvent(_)) => {
            (StatusCode::BAD_REQUEST, "[unknown event]").into_response()
        }
        Err(err) => internal_error(ProviderKind::Coinbase, err),
    }
}

fn internal_error(provider: ProviderKind, err: ProcessEventError) -> Response {
    error!(%provider, error = %err, "webhook processing failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
