//! Activation engine: converts a verified successful payment into a
//! concrete account benefit.
//!
//! The engine performs no deduplication of its own. It trusts the ledger's
//! one-winner `finish` guarantee, so it must only ever be called for a
//! payment that just transitioned to SUCCESS.
//!
//! Monotonicity of `membership_expires_at` is enforced by the directory's
//! clamped extension (`max(now, expires_at) + duration`); the engine never
//! computes expiries itself.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::catalog::{ActivatorKind, Product};
use crate::domain::foundation::DomainError;
use crate::ports::{Member, MemberNotifier, UserDirectory};

use super::payment::Payment;

/// Errors from activation. Ledger and verification failures never reach
/// this type; they are handled at the webhook boundary.
#[derive(Debug, Clone, Error)]
pub enum ActivationError {
    #[error("Payment {0} has no resolvable user")]
    UserUnresolved(String),

    #[error(transparent)]
    Directory(#[from] DomainError),
}

/// Outcome of one activation, for logging and response building.
#[derive(Debug, Clone)]
pub struct Activation {
    /// The account that received the benefit.
    pub member: Member,
    pub kind: ActivatorKind,
}

/// Applies successful payments to membership windows and invites.
pub struct ActivationEngine {
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn MemberNotifier>,
}

impl ActivationEngine {
    pub fn new(users: Arc<dyn UserDirectory>, notifier: Arc<dyn MemberNotifier>) -> Self {
        Self { users, notifier }
    }

    /// Dispatches on the product's activation strategy.
    pub async fn activate(
        &self,
        product: &Product,
        payment: &Payment,
    ) -> Result<Activation, ActivationError> {
        match product.activator {
            ActivatorKind::Subscription => {
                let member = self.resolve_payer(payment).await?;
                self.activate_subscription(product, payment, member).await
            }
            ActivatorKind::Invite => self.activate_invite(product, payment).await,
        }
    }

    /// Extends `member`'s membership window by the product duration.
    ///
    /// The directory's extension is one atomic clamped read-modify-write,
    /// migrates a legacy platform to direct, and records the payment
    /// reference and recurrence flag in the platform data bag. Notification
    /// dispatch is fire-and-forget: its failure is logged and never rolls
    /// the extension back.
    pub async fn activate_subscription(
        &self,
        product: &Product,
        payment: &Payment,
        member: Member,
    ) -> Result<Activation, ActivationError> {
        let platform_data = serde_json::json!({
            "reference": payment.reference,
            "recurrent": product.recurrence.is_recurrent(),
        });

        let extension = self
            .users
            .extend_membership(member.id, product.duration, platform_data)
            .await?;

        info!(
            user = %extension.member.id,
            reference = %payment.reference,
            product = %product.code,
            previous = ?extension.previous_expires_at,
            expires_at = ?extension.member.membership_expires_at,
            "membership extended",
        );

        let result = if extension.member.is_new() {
            self.notifier.on_registration(&extension.member).await
        } else {
            self.notifier.on_renewal(&extension.member).await
        };
        if let Err(err) = result {
            warn!(reference = %payment.reference, error = %err, "notification dispatch failed");
        }

        Ok(Activation {
            member: extension.member,
            kind: ActivatorKind::Subscription,
        })
    }

    /// Redirects the payment's benefit to the invited person.
    ///
    /// When the invitee email is absent from the payload or the account
    /// cannot be found, the paid-for duration is never dropped: the payer
    /// is credited instead, with a warning for the audit trail.
    async fn activate_invite(
        &self,
        product: &Product,
        payment: &Payment,
    ) -> Result<Activation, ActivationError> {
        let payer = self.resolve_payer(payment).await?;

        let invitee = match payment.invited_email() {
            Some(email) => self.users.find_by_email(email).await?,
            None => None,
        };

        let Some(invitee) = invitee else {
            warn!(
                reference = %payment.reference,
                payer = %payer.id,
                "invite target unresolvable, crediting payer",
            );
            return self.activate_subscription(product, payment, payer).await;
        };

        if let Err(err) = self.notifier.on_invite_sent(&payer, &invitee).await {
            warn!(reference = %payment.reference, error = %err, "invite notification failed");
        }

        let mut activation = self.activate_subscription(product, payment, invitee).await?;
        activation.kind = ActivatorKind::Invite;
        Ok(activation)
    }

    async fn resolve_payer(&self, payment: &Payment) -> Result<Member, ActivationError> {
        let user_id = payment
            .user_id
            .ok_or_else(|| ActivationError::UserUnresolved(payment.reference.clone()))?;
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ActivationError::UserUnresolved(payment.reference.clone()))
    }
}
