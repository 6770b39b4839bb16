//! Invite aggregate.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::Timestamp;

/// Invites expire one year after creation.
pub const INVITE_EXPIRATION_DAYS: i64 = 365;

/// A shareable, single-use membership grant funded by a payment.
///
/// A successful redemption sets `used_at` and `invited_user_id` exactly
/// once. The only write that ever clears them is the rollback of a claim
/// whose membership grant failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    /// Random, human-shareable code. Unique.
    pub code: String,
    /// The user who paid for the invite.
    pub owner_id: Uuid,
    /// The payment funding this invite.
    pub payment_id: Uuid,
    pub created_at: Timestamp,
    /// Set on redemption; `None` means unused.
    pub used_at: Option<Timestamp>,
    /// Email the invite was addressed to, when known ahead of redemption.
    pub invited_email: Option<String>,
    /// The account that redeemed the invite.
    pub invited_user_id: Option<Uuid>,
}

impl Invite {
    pub fn expires_at(&self) -> Timestamp {
        self.created_at.plus(Duration::days(INVITE_EXPIRATION_DAYS))
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at().is_before(&now)
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}
