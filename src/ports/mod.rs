//! Port definitions (interfaces) for external dependencies.
//!
//! Ports define the contracts between the billing domain and the outside
//! world. Adapters implement these against Postgres, provider REST APIs,
//! and the notification queue.

mod billing_gateway;
mod invite_repository;
mod notifier;
mod payment_ledger;
mod subscription_store;
mod user_directory;

pub use billing_gateway::{
    BillingGateway, CheckoutRequest, GatewayError, GatewayInvoice, GatewaySubscription,
    GatewaySubscriptionStatus,
};
pub use invite_repository::{InviteRepository, NewInvite};
pub use notifier::MemberNotifier;
pub use payment_ledger::PaymentLedger;
pub use subscription_store::SubscriptionStore;
pub use user_directory::{
    Member, MembershipExtension, MembershipPlatform, ModerationStatus, UserDirectory,
};
