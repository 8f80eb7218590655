//! Domain layer types and invariants.

pub mod articles;
pub mod error;
pub mod interactions;
pub mod users;
