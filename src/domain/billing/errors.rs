//! Ledger error taxonomy.

use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors from payment ledger operations.
///
/// `DuplicateReference` and `AlreadyFinalized` are *expected* outcomes under
/// at-least-once webhook delivery: callers at the webhook boundary swallow
/// them into the provider-expected success acknowledgement and skip
/// activation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("A payment with reference {0} already exists")]
    DuplicateReference(String),

    #[error("No payment found for reference {0}")]
    PaymentNotFound(String),

    #[error("Payment {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        LedgerError::Storage(err.to_string())
    }
}
