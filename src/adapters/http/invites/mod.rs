//! Invite endpoints: creation, redemption, owner listing.

mod dto;
mod handlers;
mod routes;

pub use handlers::InviteHandlers;
pub use routes::invite_routes;
