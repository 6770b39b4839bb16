//! Domain layer: pure business types and logic.
//!
//! Nothing in this tree touches the network or the database. External
//! effects happen behind the traits in [`crate::ports`], which the
//! activation engine and payment processing pipeline are wired against.

pub mod billing;
pub mod catalog;
pub mod foundation;
pub mod invite;
pub mod providers;
