//! Application services layer.

pub mod articles;
pub mod codes;
pub mod error;
pub mod interactions;
pub mod repos;
pub mod write_back;
