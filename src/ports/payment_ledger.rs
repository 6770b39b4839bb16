//! Payment ledger port.
//!
//! The ledger is the only synchronization primitive in the reconciliation
//! flow: the unique `reference` constraint plus the atomic conditional
//! `finish` transition are what make duplicate and concurrent webhook
//! deliveries safe. Implementations must enforce both in the storage layer,
//! not with application-level locks.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::billing::{LedgerError, NewPayment, Payment, PaymentStatus};

/// Append-mostly store of payment attempts, keyed by idempotency reference.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Records a new payment attempt.
    ///
    /// Fails with [`LedgerError::DuplicateReference`] if the reference is
    /// already present. Callers treat that as "already processed", not as a
    /// user-facing error.
    async fn start(&self, payment: NewPayment) -> Result<Payment, LedgerError>;

    /// Fetches a payment by reference.
    async fn get(&self, reference: &str) -> Result<Option<Payment>, LedgerError>;

    /// Fetches a payment by row id. Invites hold their funding payment
    /// this way.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, LedgerError>;

    /// Transitions a started payment to a terminal status.
    ///
    /// The transition must be a single atomic conditional update (update
    /// where status is still `started`) so that of two concurrent deliveries
    /// exactly one wins and proceeds to activation. The loser sees
    /// [`LedgerError::AlreadyFinalized`]; an unknown reference is
    /// [`LedgerError::PaymentNotFound`].
    ///
    /// `data` is merged over the stored payload rather than replacing it:
    /// keys written when the payment was started (the invite target) must
    /// still be readable after finalization.
    async fn finish(
        &self,
        reference: &str,
        status: PaymentStatus,
        data: serde_json::Value,
    ) -> Result<Payment, LedgerError>;

    /// Payment history for a user, newest first. Audit/display only.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, LedgerError>;
}
