//! Cache configuration.
//!
//! TTLs and sizing for the content, counter and one-time code caches.

use std::time::Duration;

const DEFAULT_CONTENT_TTL_SECS: u64 = 600;
const DEFAULT_INTERACTIVE_TTL_SECS: u64 = 900;
const DEFAULT_FIRST_PAGE_SIZE: u32 = 100;
const DEFAULT_PRECACHE_MAX_BYTES: usize = 1024 * 1024;

const DEFAULT_CODE_TTL_SECS: u64 = 600;
const DEFAULT_CODE_RESEND_COOLDOWN_SECS: u64 = 60;
const DEFAULT_CODE_VERIFY_ATTEMPTS: u32 = 3;

/// Content and counter cache tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of detail, public detail and first-page entries.
    pub content_ttl: Duration,
    /// Lifetime of cached interaction aggregates.
    pub interactive_ttl: Duration,
    /// Limit of the author listing page that is cached.
    pub first_page_size: u32,
    /// Bodies at or above this size are not pre-cached after a listing.
    pub precache_max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            content_ttl: Duration::from_secs(DEFAULT_CONTENT_TTL_SECS),
            interactive_ttl: Duration::from_secs(DEFAULT_INTERACTIVE_TTL_SECS),
            first_page_size: DEFAULT_FIRST_PAGE_SIZE,
            precache_max_bytes: DEFAULT_PRECACHE_MAX_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            content_ttl: settings.content_ttl,
            interactive_ttl: settings.interactive_ttl,
            first_page_size: settings.first_page_size.get(),
            precache_max_bytes: settings.precache_max_bytes,
        }
    }
}

/// One-time code lifetimes and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeConfig {
    pub ttl: Duration,
    /// Minimum spacing between two sends to the same recipient.
    pub resend_cooldown: Duration,
    pub verify_attempts: u32,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CODE_TTL_SECS),
            resend_cooldown: Duration::from_secs(DEFAULT_CODE_RESEND_COOLDOWN_SECS),
            verify_attempts: DEFAULT_CODE_VERIFY_ATTEMPTS,
        }
    }
}

impl From<&crate::config::CodeSettings> for CodeConfig {
    fn from(settings: &crate::config::CodeSettings) -> Self {
        Self {
            ttl: settings.ttl,
            resend_cooldown: settings.resend_cooldown,
            verify_attempts: settings.verify_attempts.get(),
        }
    }
}
