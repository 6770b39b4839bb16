//! Invite repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::invite::Invite;

/// An invite to be persisted.
#[derive(Debug, Clone)]
pub struct NewInvite {
    pub code: String,
    pub owner_id: Uuid,
    pub payment_id: Uuid,
    pub invited_email: Option<String>,
}

/// Storage for invites.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    /// Inserts an invite.
    ///
    /// Fails with a `ValidationFailed` domain error when the code collides
    /// with an existing one (unique constraint); the caller retries with a
    /// fresh code.
    async fn create(&self, invite: NewInvite) -> Result<Invite, DomainError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Invite>, DomainError>;

    /// Marks an invite used by `user_id` at `used_at`.
    ///
    /// Must be a conditional update (`WHERE used_at IS NULL`). Returns
    /// `true` only for the caller that actually flipped the row; a
    /// concurrent second redeemer gets `false` and must report the invite
    /// as already used.
    async fn mark_used(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        used_at: Timestamp,
    ) -> Result<bool, DomainError>;

    /// Reopens a claim taken by `user_id` whose membership grant failed.
    ///
    /// Conditional on the claim still belonging to that user, so it can
    /// never undo a claim won by someone else. Returns `true` when the
    /// invite was made redeemable again.
    async fn release(&self, invite_id: Uuid, user_id: Uuid) -> Result<bool, DomainError>;

    /// Invites created by a user, newest first.
    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Invite>, DomainError>;
}
