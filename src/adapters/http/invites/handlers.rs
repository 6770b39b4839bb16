//! HTTP handlers for invite endpoints.
//!
//! Invite errors are user-facing by design: the messages in
//! `InviteError` are safe to render verbatim.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::application::handlers::invites::{
    CreateInviteCommand, CreateInviteError, CreateInviteHandler, RedeemInviteHandler,
};
use crate::domain::catalog::ProductCode;
use crate::domain::invite::InviteError;
use crate::ports::InviteRepository;

use super::super::ErrorResponse;
use super::dto::{
    CreateInviteRequest, InviteResponse, RedeemInviteRequest, RedeemInviteResponse,
};

#[derive(Clone)]
pub struct InviteHandlers {
    create_handler: Arc<CreateInviteHandler>,
    redeem_handler: Arc<RedeemInviteHandler>,
    invites: Arc<dyn InviteRepository>,
}

impl InviteHandlers {
    pub fn new(
        create_handler: Arc<CreateInviteHandler>,
        redeem_handler: Arc<RedeemInviteHandler>,
        invites: Arc<dyn InviteRepository>,
    ) -> Self {
        Self {
            create_handler,
            redeem_handler,
            invites,
        }
    }
}

/// POST /invites - Mint a pre-paid invite
pub async fn create_invite(
    State(handlers): State<InviteHandlers>,
    Json(req): Json<CreateInviteRequest>,
) -> Response {
    let cmd = CreateInviteCommand {
        owner_id: req.owner_id,
        product_code: ProductCode::new(req.product_code),
        invited_email: req.invited_email,
    };

    match handlers.create_handler.handle(cmd).await {
        Ok(invite) => {
            (StatusCode::CREATED, Json(InviteResponse::from(invite))).into_response()
        }
        Err(err @ CreateInviteError::UnknownProduct(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(err.to_string())),
        )
            .into_response(),
        Err(CreateInviteError::Storage(message)) => {
            error!(%message, "invite creation failed");
            internal_error()
        }
    }
}

/// POST /invites/redeem - Redeem an invite code for an account
pub async fn redeem_invite(
    State(handlers): State<InviteHandlers>,
    Json(req): Json<RedeemInviteRequest>,
) -> Response {
    match handlers.redeem_handler.handle(&req.code, &req.email).await {
        Ok(result) => {
            let response = RedeemInviteResponse {
                email: result.member.email,
                membership_expires_at: *result.member.membership_expires_at.as_datetime(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(InviteError::Storage(message)) => {
            error!(%message, code = %req.code, "invite redemption failed");
            internal_error()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(err.to_string())),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct InviteListQuery {
    pub owner_id: Uuid,
}

/// GET /invites?owner_id=.. - Invites created by an account, newest first
pub async fn list_invites(
    State(handlers): State<InviteHandlers>,
    Query(query): Query<InviteListQuery>,
) -> Response {
    match handlers.invites.list_for_owner(query.owner_id).await {
        Ok(invites) => {
            let invites: Vec<InviteResponse> =
                invites.into_iter().map(InviteResponse::from).collect();
            Json(invites).into_response()
        }
        Err(err) => {
            error!(error = %err, owner = %query.owner_id, "invite listing failed");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Something went wrong, please try again")),
    )
        .into_response()
}
