//! Code rate limiter: one-time codes with a resend cooldown and a bounded
//! number of verify attempts, kept entirely in the cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use super::backend::KvCache;
use super::config::CodeConfig;
use super::error::CacheError;
use super::keys;
use super::scripts::{
    SET_CODE, SET_CODE_NO_EXPIRY, SET_CODE_STORED, SET_CODE_TOO_SOON, VERIFY_CODE,
    VERIFY_CODE_EXHAUSTED, VERIFY_CODE_MATCHED, VERIFY_CODE_MISMATCH,
};

const TARGET: &str = "lectern::cache::codes";

#[derive(Debug, Error)]
pub enum CodeLimitError {
    #[error("a code was sent to this recipient too recently")]
    SendTooFrequent,
    #[error("verify attempts for this code are exhausted")]
    VerifyTooFrequent,
    #[error("code key `{key}` exists without an expiry")]
    SystemInconsistent { key: String },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub struct CodeCache {
    kv: Arc<dyn KvCache>,
    config: CodeConfig,
}

impl CodeCache {
    pub fn new(kv: Arc<dyn KvCache>, config: CodeConfig) -> Self {
        Self { kv, config }
    }

    /// Store `code` for `(biz, recipient)` unless the cooldown is still running.
    pub async fn set(&self, biz: &str, recipient: &str, code: &str) -> Result<(), CodeLimitError> {
        let key = keys::code(biz, recipient);
        let args = [
            code.to_string(),
            self.config.ttl.as_secs().to_string(),
            self.config.resend_cooldown.as_secs().to_string(),
            self.config.verify_attempts.to_string(),
        ];
        let reply = self
            .kv
            .run_script(&SET_CODE, std::slice::from_ref(&key), &args)
            .await?;
        match reply {
            SET_CODE_STORED => Ok(()),
            SET_CODE_TOO_SOON => Err(CodeLimitError::SendTooFrequent),
            SET_CODE_NO_EXPIRY => {
                error!(target = TARGET, cache_key = %key, "Code key has no expiry");
                Err(CodeLimitError::SystemInconsistent { key })
            }
            reply => Err(CacheError::UnexpectedReply {
                script: SET_CODE.name,
                reply,
            }
            .into()),
        }
    }

    /// Compare `input` with the stored code; a match clears it.
    pub async fn verify(
        &self,
        biz: &str,
        recipient: &str,
        input: &str,
    ) -> Result<bool, CodeLimitError> {
        let key = keys::code(biz, recipient);
        let reply = self
            .kv
            .run_script(&VERIFY_CODE, &[key], &[input.to_string()])
            .await?;
        match reply {
            VERIFY_CODE_MATCHED => Ok(true),
            VERIFY_CODE_MISMATCH => Ok(false),
            VERIFY_CODE_EXHAUSTED => Err(CodeLimitError::VerifyTooFrequent),
            reply => Err(CacheError::UnexpectedReply {
                script: VERIFY_CODE.name,
                reply,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::memory::MemoryCache;

    fn limiter() -> (Arc<MemoryCache>, CodeCache) {
        let kv = Arc::new(MemoryCache::new());
        (kv.clone(), CodeCache::new(kv, CodeConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn resend_is_blocked_during_cooldown() {
        let (_, limiter) = limiter();
        limiter.set("login", "155", "111111").await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            limiter.set("login", "155", "222222").await,
            Err(CodeLimitError::SendTooFrequent)
        ));

        tokio::time::advance(Duration::from_secs(40)).await;
        limiter.set("login", "155", "333333").await.unwrap();
        assert!(limiter.verify("login", "155", "333333").await.unwrap());
    }

    #[tokio::test]
    async fn recipients_and_biz_are_isolated() {
        let (_, limiter) = limiter();
        limiter.set("login", "155", "111111").await.unwrap();
        limiter.set("login", "156", "111111").await.unwrap();
        limiter.set("reset", "155", "111111").await.unwrap();
    }

    #[tokio::test]
    async fn persistent_key_is_inconsistent() {
        let (kv, limiter) = limiter();
        kv.set(&keys::code("login", "155"), b"111111".to_vec(), None)
            .await
            .unwrap();
        let err = limiter.set("login", "155", "222222").await.unwrap_err();
        assert!(matches!(err, CodeLimitError::SystemInconsistent { .. }));
    }

    #[tokio::test]
    async fn fourth_verify_fails_after_three_misses() {
        let (_, limiter) = limiter();
        limiter.set("login", "155", "123456").await.unwrap();
        for _ in 0..3 {
            assert!(!limiter.verify("login", "155", "000000").await.unwrap());
        }
        assert!(matches!(
            limiter.verify("login", "155", "123456").await,
            Err(CodeLimitError::VerifyTooFrequent)
        ));
    }

    #[tokio::test]
    async fn verify_without_code_is_exhausted() {
        let (_, limiter) = limiter();
        assert!(matches!(
            limiter.verify("login", "155", "123456").await,
            Err(CodeLimitError::VerifyTooFrequent)
        ));
    }
}
