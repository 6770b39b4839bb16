//! Billing use cases: webhook event processing, checkout creation,
//! subscription stopping.

mod create_checkout;
mod process_payment_event;
mod stop_subscription;

pub use create_checkout::{
    CreateCheckoutCommand, CreateCheckoutError, CreateCheckoutHandler, CreateCheckoutResult,
};
pub use process_payment_event::{
    EventOutcome, ProcessEventError, ProcessPaymentEventHandler,
};
pub use stop_subscription::{StopSubscriptionError, StopSubscriptionHandler};
