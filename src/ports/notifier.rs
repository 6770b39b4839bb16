//! Notification port.
//!
//! Notifications are fire-and-forget: a failure here is logged by the
//! caller and never rolls back billing state or fails a webhook response.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::Member;

/// Outbound notification dispatch (email/chat), owned by the notification
/// subsystem. The billing engine only decides *which* notification to send.
#[async_trait]
pub trait MemberNotifier: Send + Sync {
    /// First successful payment for a fresh account.
    async fn on_registration(&self, member: &Member) -> Result<(), DomainError>;

    /// Membership extension for an existing account.
    async fn on_renewal(&self, member: &Member) -> Result<(), DomainError>;

    /// An invite-funding payment succeeded: tell both sides.
    async fn on_invite_sent(&self, payer: &Member, invitee: &Member) -> Result<(), DomainError>;
}
