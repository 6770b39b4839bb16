//! Billing domain module.
//!
//! Owns the payment ledger semantics, the canonical webhook event shape,
//! the activation engine, and the local subscription mirror.
//!
//! # Module Structure
//!
//! - `payment` - Payment aggregate and status machine
//! - `event` - provider-agnostic `PaymentEvent` produced by verifiers
//! - `activation` - converts a successful payment into an account benefit
//! - `subscription` - recurring-billing mirror, kept for audit

mod activation;
mod errors;
mod event;
mod payment;
mod subscription;

pub use activation::{Activation, ActivationEngine, ActivationError};
pub use errors::LedgerError;
pub use event::{EventKind, PaymentEvent, TransactionStatus};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use subscription::{NewSubscription, Subscription, SubscriptionStatus};
