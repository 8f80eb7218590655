//! Key-value cache adapter contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheError;
use super::scripts::AtomicScript;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

/// Distributed key-value store with TTLs and atomic scripts.
///
/// Implementations must execute [`KvCache::run_script`] as one indivisible
/// step with respect to every other call on the same key.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value`; `ttl = None` keeps the key until deleted.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn run_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, CacheError>;

    /// All fields of a hash; empty when the key is absent.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
