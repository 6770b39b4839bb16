//! Shared domain primitives.
//!
//! # Module Organization
//!
//! - `errors` - `DomainError` and `ErrorCode` used at port boundaries
//! - `timestamp` - immutable UTC point-in-time value object

mod errors;
mod timestamp;

pub use errors::{DomainError, ErrorCode};
pub use timestamp::Timestamp;
