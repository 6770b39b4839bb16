//! CreateInviteHandler - mints an invite backed by a pre-paid payment.
//!
//! Used for invites granted out of band (bank transfer, admin grant): the
//! funding payment is booked directly as successful with a self-assigned
//! reference, then an invite code is attached to it. Code generation
//! retries on collision a few times before falling back to a UUID-derived
//! code that cannot collide.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::billing::{LedgerError, NewPayment};
use crate::domain::catalog::{Catalog, CatalogError, ProductCode};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::invite::{Invite, InviteCode};
use crate::ports::{InviteRepository, NewInvite, PaymentLedger};

const CODE_COLLISION_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct CreateInviteCommand {
    /// The account the invite is granted on behalf of.
    pub owner_id: Uuid,
    /// Invite product to fund; the redeemer gets its duration.
    pub product_code: ProductCode,
    /// Email the invite is addressed to, when known up front.
    pub invited_email: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum CreateInviteError {
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Something went wrong, please try again")]
    Storage(String),
}

impl From<CatalogError> for CreateInviteError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownProduct(code) => CreateInviteError::UnknownProduct(code),
            other => CreateInviteError::Storage(other.to_string()),
        }
    }
}

impl From<LedgerError> for CreateInviteError {
    fn from(err: LedgerError) -> Self {
        CreateInviteError::Storage(err.to_string())
    }
}

impl From<DomainError> for CreateInviteError {
    fn from(err: DomainError) -> Self {
        CreateInviteError::Storage(err.to_string())
    }
}

pub struct CreateInviteHandler {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn PaymentLedger>,
    invites: Arc<dyn InviteRepository>,
}

impl CreateInviteHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn PaymentLedger>,
        invites: Arc<dyn InviteRepository>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            invites,
        }
    }

    pub async fn handle(&self, command: CreateInviteCommand) -> Result<Invite, CreateInviteError> {
        let product = self.catalog.get(&command.product_code)?.clone();

        let reference = format!("bank-{}", random_suffix());
        let payment = self
            .ledger
            .start(NewPayment::settled(
                reference,
                Some(command.owner_id),
                product.code.clone(),
                product.amount,
                serde_json::json!({ "source": "bank" }),
            ))
            .await?;

        let mut code = InviteCode::generate();
        for attempt in 0..=CODE_COLLISION_RETRIES {
            let result = self
                .invites
                .create(NewInvite {
                    code: code.clone(),
                    owner_id: command.owner_id,
                    payment_id: payment.id,
                    invited_email: command.invited_email.clone(),
                })
                .await;

            match result {
                Ok(invite) => {
                    info!(
                        invite = %invite.code,
                        owner = %command.owner_id,
                        reference = %payment.reference,
                        "invite created",
                    );
                    return Ok(invite);
                }
                Err(err) if err.code() == ErrorCode::ValidationFailed => {
                    warn!(code = %code, attempt, "invite code collision, regenerating");
                    code = if attempt + 1 < CODE_COLLISION_RETRIES {
                        InviteCode::generate()
                    } else {
                        InviteCode::fallback()
                    };
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CreateInviteError::Storage(
            "could not allocate a unique invite code".to_string(),
        ))
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}
