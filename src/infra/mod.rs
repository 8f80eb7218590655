//! Infrastructure adapters and runtime bootstrap.

pub mod blobs;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod memory;
pub mod telemetry;
