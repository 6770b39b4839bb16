//! Clubhouse - Membership Community Backend
//!
//! This crate implements the payment reconciliation engine for the club:
//! webhook verification for the supported payment processors, an idempotent
//! payment ledger, and the activation engine that converts verified payments
//! into membership time or invite redemptions.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
