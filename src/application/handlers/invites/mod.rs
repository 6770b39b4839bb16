//! Invite command handlers.

mod create_invite;
mod redeem_invite;

pub use create_invite::{CreateInviteCommand, CreateInviteError, CreateInviteHandler};
pub use redeem_invite::{RedeemInviteHandler, RedeemInviteResult};
