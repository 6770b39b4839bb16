//! HTTP handlers for billing endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::application::handlers::billing::{
    CreateCheckoutCommand, CreateCheckoutError, CreateCheckoutHandler, StopSubscriptionError,
    StopSubscriptionHandler,
};
use crate::domain::catalog::ProductCode;
use crate::ports::{PaymentLedger, UserDirectory};

use super::super::ErrorResponse;
use super::dto::{
    CheckoutResponse, CreateCheckoutRequest, PaymentResponse, StopSubscriptionRequest,
};

#[derive(Clone)]
pub struct BillingHandlers {
    create_checkout_handler: Arc<CreateCheckoutHandler>,
    stop_subscription_handler: Arc<StopSubscriptionHandler>,
    ledger: Arc<dyn PaymentLedger>,
    users: Arc<dyn UserDirectory>,
}

impl BillingHandlers {
    pub fn new(
        create_checkout_handler: Arc<CreateCheckoutHandler>,
        stop_subscription_handler: Arc<StopSubscriptionHandler>,
        ledger: Arc<dyn PaymentLedger>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            create_checkout_handler,
            stop_subscription_handler,
            ledger,
            users,
        }
    }
}

/// POST /billing/checkout - Open a provider checkout for a product
pub async fn create_checkout(
    State(handlers): State<BillingHandlers>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Response {
    let payer = match req.user_id {
        Some(user_id) => match handlers.users.find_by_id(user_id).await {
            Ok(Some(member)) => Some(member),
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("No such account")),
                )
                    .into_response();
            }
            Err(err) => {
                error!(error = %err, "payer lookup failed");
                return internal_error();
            }
        },
        None => None,
    };

    let cmd = CreateCheckoutCommand {
        provider: req.provider,
        product_code: ProductCode::new(req.product_code),
        email: req.email,
        payer,
        invite_email: req.invite_email,
    };

    match handlers.create_checkout_handler.handle(cmd).await {
        Ok(result) => {
            let response = CheckoutResponse {
                reference: result.payment.reference,
                url: result.invoice.url,
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => checkout_error(err),
    }
}

/// POST /billing/subscriptions/:id/stop - Cancel a recurring agreement
pub async fn stop_subscription(
    State(handlers): State<BillingHandlers>,
    Path(subscription_id): Path<String>,
    Json(req): Json<StopSubscriptionRequest>,
) -> Response {
    match handlers
        .stop_subscription_handler
        .handle(req.provider, &subscription_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err @ StopSubscriptionError::ProviderUnavailable(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(err.to_string())),
        )
            .into_response(),
        Err(err @ StopSubscriptionError::Gateway(_)) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new(err.to_string())),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, subscription = %subscription_id, "stop failed");
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentHistoryQuery {
    pub user_id: Uuid,
}

/// GET /billing/payments?user_id=.. - Payment history, newest first
pub async fn list_payments(
    State(handlers): State<BillingHandlers>,
    Query(query): Query<PaymentHistoryQuery>,
) -> Response {
    match handlers.ledger.list_for_user(query.user_id).await {
        Ok(payments) => {
            let payments: Vec<PaymentResponse> =
                payments.into_iter().map(PaymentResponse::from).collect();
            Json(payments).into_response()
        }
        Err(err) => {
            error!(error = %err, user = %query.user_id, "payment history lookup failed");
            internal_error()
        }
    }
}

fn checkout_error(err: CreateCheckoutError) -> Response {
    match err {
        CreateCheckoutError::InvalidEmail
        | CreateCheckoutError::UnknownProduct(_)
        | CreateCheckoutError::LegacyProduct(_)
        | CreateCheckoutError::ProviderUnavailable(_) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(err.to_string())),
        )
            .into_response(),
        CreateCheckoutError::Gateway(message) => {
            error!(%message, "checkout rejected by provider");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new(
                    "The payment provider rejected the request, please try again",
                )),
            )
                .into_response()
        }
        CreateCheckoutError::Storage(message) => {
            error!(%message, "checkout failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Something went wrong, please try again")),
    )
        .into_response()
}
