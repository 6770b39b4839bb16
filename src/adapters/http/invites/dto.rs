//! Request/response DTOs for invite endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::invite::Invite;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub owner_id: Uuid,
    pub product_code: String,
    pub invited_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemInviteRequest {
    pub code: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub code: String,
    pub invited_email: Option<String>,
    pub used: bool,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<Invite> for InviteResponse {
    fn from(invite: Invite) -> Self {
        Self {
            code: invite.code.clone(),
            invited_email: invite.invited_email.clone(),
            used: invite.is_used(),
            expires_at: *invite.expires_at().as_datetime(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RedeemInviteResponse {
    pub email: String,
    pub membership_expires_at: chrono::DateTime<chrono::Utc>,
}
