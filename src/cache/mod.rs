//! Lectern cache layer
//!
//! A key-value adapter contract ([`KvCache`]) with two backends, and three
//! caches built on it:
//!
//! - **Content cache** ([`ArticleCache`]): detail, public detail and first page
//! - **Counter cache** ([`InteractiveCache`]): per-entity interaction hashes
//! - **Code rate limiter** ([`CodeCache`]): one-time codes with send/verify budgets
//!
//! Every value that more than one caller may mutate concurrently is changed
//! through an [`AtomicScript`], never by get-then-set.

mod backend;
mod codes;
mod config;
mod content;
mod counters;
mod error;
pub mod keys;
mod lock;
mod memory;
mod remote;
pub mod scripts;

pub use backend::{KeyTtl, KvCache};
pub use codes::{CodeCache, CodeLimitError};
pub use config::{CacheConfig, CodeConfig};
pub use content::ArticleCache;
pub use counters::InteractiveCache;
pub use error::CacheError;
pub use memory::MemoryCache;
pub use remote::{RedisCache, RedisOptions};
pub use scripts::AtomicScript;

pub(crate) use lock::mutex_lock;
