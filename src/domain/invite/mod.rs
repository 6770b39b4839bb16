//! Invite domain module.
//!
//! An invite wraps a payment so its benefit can be redirected to a third
//! party: the owner pays, the holder of the code gets the membership.

mod code;
mod errors;
mod invite;

pub use code::InviteCode;
pub use errors::InviteError;
pub use invite::{Invite, INVITE_EXPIRATION_DAYS};
