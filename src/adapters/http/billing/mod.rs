//! Billing endpoints: checkout creation, subscription stop, payment history.

mod dto;
mod handlers;
mod routes;

pub use handlers::BillingHandlers;
pub use routes::billing_routes;
