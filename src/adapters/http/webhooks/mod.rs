//! Inbound webhook endpoints, one route per payment processor.

mod handlers;
mod routes;

pub use handlers::WebhookHandlers;
pub use routes::webhook_routes;
