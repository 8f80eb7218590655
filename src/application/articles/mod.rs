mod commands;
mod queries;
mod service;
pub mod types;

pub use service::*;
pub use types::{ArticleError, ArticleServiceConfig, PublishMode};

#[cfg(test)]
mod tests;
