//! Application layer: command handlers orchestrating domain logic and ports.

pub mod handlers;
