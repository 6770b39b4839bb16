//! Invite route definitions.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{create_invite, list_invites, redeem_invite, InviteHandlers};

/// Creates the invite router.
pub fn invite_routes(handlers: InviteHandlers) -> Router {
    Router::new()
        .route("/", post(create_invite))
        .route("/", get(list_invites))
        .route("/redeem", post(redeem_invite))
        .with_state(handlers)
}
