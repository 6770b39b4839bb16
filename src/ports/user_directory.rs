//! User directory port.
//!
//! The identity subsystem owns the User; this port exposes only the
//! membership-relevant fields, and it is the *only* place allowed to mutate
//! them. Keeping the clamped extension inside one port method is what makes
//! the monotonicity invariant enforceable.

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Timestamp};

/// Which platform currently carries the user's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipPlatform {
    Direct,
    /// Legacy platform; migrated to `Direct` on the first direct payment.
    Patreon,
    Crypto,
}

impl MembershipPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipPlatform::Direct => "direct",
            MembershipPlatform::Patreon => "patreon",
            MembershipPlatform::Crypto => "crypto",
        }
    }
}

/// Moderation state of the account, as far as billing cares.
///
/// `Intro` means the account was provisioned but never went through review;
/// a first successful payment for such an account triggers the registration
/// notification instead of the renewal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Intro,
    OnReview,
    Approved,
    Rejected,
}

/// Membership-relevant view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub membership_expires_at: Timestamp,
    pub membership_platform: MembershipPlatform,
    /// Opaque bag: last payment reference, recurrence flag, provider
    /// credentials. Overwritten on every successful activation.
    pub membership_platform_data: serde_json::Value,
    pub moderation_status: ModerationStatus,
    /// Card provider's customer id, once known.
    pub customer_id: Option<String>,
}

impl Member {
    /// Whether this account has never completed onboarding.
    pub fn is_new(&self) -> bool {
        self.moderation_status == ModerationStatus::Intro
    }
}

/// Result of one membership extension.
#[derive(Debug, Clone)]
pub struct MembershipExtension {
    pub member: Member,
    /// Expiry before the extension, for logging and assertions.
    pub previous_expires_at: Timestamp,
}

/// Collaborator interface consumed from the identity subsystem.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by normalized email, creating a minimal account with
    /// the given platform and an already-expired membership if absent.
    async fn get_or_create_by_email(
        &self,
        email: &str,
        platform: MembershipPlatform,
    ) -> Result<Member, DomainError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>, DomainError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>, DomainError>;

    /// Finds a user by the card provider's customer id.
    async fn find_by_customer_id(&self, customer_id: &str)
        -> Result<Option<Member>, DomainError>;

    /// Records the provider customer id against the account with this email.
    async fn link_customer_id(&self, email: &str, customer_id: &str) -> Result<(), DomainError>;

    /// Extends the membership window by `duration`, clamped to now.
    ///
    /// The storage layer must implement this as one atomic read-modify-write
    /// (`GREATEST(membership_expires_at, now()) + duration`) so that two
    /// concurrent activations for the same user both land and neither is
    /// lost. The update also migrates a legacy platform to `Direct` and
    /// overwrites `membership_platform_data` with the given payload.
    async fn extend_membership(
        &self,
        user_id: Uuid,
        duration: Duration,
        platform_data: serde_json::Value,
    ) -> Result<MembershipExtension, DomainError>;
}
