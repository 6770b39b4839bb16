//! Invite error taxonomy.
//!
//! These errors are user-facing: they carry no sensitive detail and are
//! safe to render at the redemption boundary.

use thiserror::Error;

use crate::domain::foundation::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InviteError {
    #[error("No invite found for this code")]
    NotFound,

    #[error("This invite has already been used")]
    AlreadyUsed,

    #[error("This invite has expired")]
    Expired,

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Something went wrong, please try again")]
    Storage(String),
}

impl From<DomainError> for InviteError {
    fn from(err: DomainError) -> Self {
        InviteError::Storage(err.to_string())
    }
}
