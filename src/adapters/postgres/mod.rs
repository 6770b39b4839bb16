//! PostgreSQL adapter implementations.
//!
//! All idempotency guarantees live here: unique indexes plus conditional
//! updates, never application-level locks.

mod invite_repository;
mod payment_ledger;
mod subscription_store;
mod user_directory;

pub use invite_repository::PostgresInviteRepository;
pub use payment_ledger::PostgresPaymentLedger;
pub use subscription_store::PostgresSubscriptionStore;
pub use user_directory::PostgresUserDirectory;
