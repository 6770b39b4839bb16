//! RedeemInviteHandler - turns an invite code into an activated membership.
//!
//! The invite is claimed *before* activation runs: `mark_used` is a
//! conditional update on `used_at IS NULL`, so of two concurrent redeemers
//! exactly one flips the row and proceeds. The loser gets `AlreadyUsed` and
//! no second activation ever happens. When activation fails after the
//! claim, the claim is released so the code stays redeemable.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::billing::ActivationEngine;
use crate::domain::catalog::Catalog;
use crate::domain::foundation::Timestamp;
use crate::domain::invite::{Invite, InviteError};
use crate::ports::{InviteRepository, Member, MembershipPlatform, PaymentLedger, UserDirectory};

#[derive(Debug, Clone)]
pub struct RedeemInviteResult {
    /// The account the invite was applied to.
    pub member: Member,
    pub invite: Invite,
}

pub struct RedeemInviteHandler {
    catalog: Arc<Catalog>,
    invites: Arc<dyn InviteRepository>,
    ledger: Arc<dyn PaymentLedger>,
    users: Arc<dyn UserDirectory>,
    engine: Arc<ActivationEngine>,
}

impl RedeemInviteHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        invites: Arc<dyn InviteRepository>,
        ledger: Arc<dyn PaymentLedger>,
        users: Arc<dyn UserDirectory>,
        engine: Arc<ActivationEngine>,
    ) -> Self {
        Self {
            catalog,
            invites,
            ledger,
            users,
            engine,
        }
    }

    pub async fn handle(
        &self,
        code: &str,
        email: &str,
    ) -> Result<RedeemInviteResult, InviteError> {
        let invite = self
            .invites
            .find_by_code(code.trim())
            .await?
            .ok_or(InviteError::NotFound)?;

        if invite.is_used() {
            return Err(InviteError::AlreadyUsed);
        }
        if invite.is_expired(Timestamp::now()) {
            return Err(InviteError::Expired);
        }

        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(InviteError::InvalidEmail);
        }

        let payment = self
            .ledger
            .find_by_id(invite.payment_id)
            .await
            .map_err(|e| InviteError::Storage(e.to_string()))?
            .ok_or_else(|| InviteError::Storage("invite payment is missing".to_string()))?;

        let product = self
            .catalog
            .get(&payment.product_code)
            .map_err(|e| InviteError::Storage(e.to_string()))?
            .clone();

        let member = self
            .users
            .get_or_create_by_email(&email, MembershipPlatform::Direct)
            .await?;

        // Claim before activating so a concurrent redeemer cannot double
        // the benefit.
        let claimed = self
            .invites
            .mark_used(invite.id, member.id, Timestamp::now())
            .await?;
        if !claimed {
            return Err(InviteError::AlreadyUsed);
        }

        let member_id = member.id;
        let activation = match self
            .engine
            .activate_subscription(&product, &payment, member)
            .await
        {
            Ok(activation) => activation,
            Err(err) => {
                // A transient fault must not burn the code.
                match self.invites.release(invite.id, member_id).await {
                    Ok(true) => {}
                    Ok(false) => warn!(invite = %invite.code, "claim was not released"),
                    Err(release_err) => {
                        warn!(invite = %invite.code, error = %release_err, "claim release failed");
                    }
                }
                return Err(InviteError::Storage(err.to_string()));
            }
        };

        info!(
            invite = %invite.code,
            user = %activation.member.id,
            product = %product.code,
            "invite redeemed",
        );

        Ok(RedeemInviteResult {
            member: activation.member,
            invite,
        })
    }
}
