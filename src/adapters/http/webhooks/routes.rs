//! Webhook route definitions.

use axum::routing::post;
use axum::Router;

use super::handlers::{
    cloudpayments_webhook, coinbase_webhook, stripe_legacy_webhook, stripe_webhook,
    wayforpay_webhook, WebhookHandlers,
};

/// Creates the webhook router, one endpoint per processor.
pub fn webhook_routes(handlers: WebhookHandlers) -> Router {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/stripe/legacy", post(stripe_legacy_webhook))
        .route("/cloudpayments", post(cloudpayments_webhook))
        .route("/wayforpay", post(wayforpay_webhook))
        .route("/coinbase", post(coinbase_webhook))
        .with_state(handlers)
}
