//! Structured-log implementation of the MemberNotifier port.
//!
//! Delivery (email, chat) is owned by the notification subsystem, which
//! tails these events. Callers already treat notification failures as
//! non-fatal, so this adapter never fails.

use async_trait::async_trait;
use tracing::info;

use crate::domain::foundation::DomainError;
use crate::ports::{Member, MemberNotifier};

#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MemberNotifier for LogNotifier {
    async fn on_registration(&self, member: &Member) -> Result<(), DomainError> {
        info!(
            event = "member.registered",
            user = %member.id,
            email = %member.email,
            expires_at = ?member.membership_expires_at,
            "new member registered",
        );
        Ok(())
    }

    async fn on_renewal(&self, member: &Member) -> Result<(), DomainError> {
        info!(
            event = "member.renewed",
            user = %member.id,
            expires_at = ?member.membership_expires_at,
            "membership renewed",
        );
        Ok(())
    }

    async fn on_invite_sent(&self, payer: &Member, invitee: &Member) -> Result<(), DomainError> {
        info!(
            event = "invite.sent",
            payer = %payer.id,
            invitee = %invitee.id,
            "invite granted",
        );
        Ok(())
    }
}
