//! Billing route definitions.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{create_checkout, list_payments, stop_subscription, BillingHandlers};

/// Creates the billing router.
pub fn billing_routes(handlers: BillingHandlers) -> Router {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/payments", get(list_payments))
        .route("/subscriptions/:id/stop", post(stop_subscription))
        .with_state(handlers)
}
