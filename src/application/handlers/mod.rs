//! Command handlers.
//!
//! Each handler owns one use case end to end: resolve collaborators through
//! ports, run domain logic, map failures into a use-case error type the HTTP
//! layer can translate.

pub mod billing;
pub mod invites;
