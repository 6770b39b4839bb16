//! HTTP adapter: axum routers for webhooks, billing, and invites.

mod billing;
mod invites;
mod webhooks;

pub use billing::{billing_routes, BillingHandlers};
pub use invites::{invite_routes, InviteHandlers};
pub use webhooks::{webhook_routes, WebhookHandlers};

use serde::Serialize;

/// Error body shared by all JSON endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
