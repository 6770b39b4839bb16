//! Adapters: concrete implementations of the ports.
//!
//! Postgres for persistence, reqwest clients for provider REST APIs, axum
//! for the inbound HTTP surface, and a structured-log notifier.

pub mod gateways;
pub mod http;
pub mod notify;
pub mod postgres;
