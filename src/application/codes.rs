//! One-time code issuance and verification.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::info;

use crate::cache::{CodeCache, CodeLimitError};
use crate::domain::error::{DomainError, ensure_biz, ensure_non_empty};

const TARGET: &str = "lectern::application::codes";
const DEFAULT_CODE_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum CodeError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Limiter(#[from] CodeLimitError),
    #[error("code delivery failed: {0}")]
    Delivery(String),
}

/// Hands a freshly issued code to the recipient (SMS gateway, mailer, ...).
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send(&self, biz: &str, recipient: &str, code: &str) -> Result<(), CodeError>;
}

/// Logs codes instead of delivering them; for local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCodeSender;

#[async_trait]
impl CodeSender for TracingCodeSender {
    async fn send(&self, biz: &str, recipient: &str, code: &str) -> Result<(), CodeError> {
        info!(target = TARGET, biz, recipient, code, "One-time code issued");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CodeService {
    limiter: CodeCache,
    sender: Arc<dyn CodeSender>,
    length: usize,
}

impl CodeService {
    pub fn new(limiter: CodeCache, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            limiter,
            sender,
            length: DEFAULT_CODE_LENGTH,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.clamp(1, 18);
        self
    }

    /// Issue a code for `(biz, recipient)` and deliver it.
    pub async fn send(&self, biz: &str, recipient: &str) -> Result<(), CodeError> {
        ensure_biz(biz)?;
        ensure_non_empty(recipient, "recipient")?;

        let code = generate_code(self.length);
        self.limiter.set(biz, recipient, &code).await?;
        self.sender.send(biz, recipient, &code).await
    }

    /// Check `input` against the issued code. Returns `false` on mismatch.
    pub async fn verify(&self, biz: &str, recipient: &str, input: &str) -> Result<bool, CodeError> {
        ensure_biz(biz)?;
        ensure_non_empty(recipient, "recipient")?;
        Ok(self.limiter.verify(biz, recipient, input).await?)
    }
}

/// Zero-padded decimal code of `length` digits.
fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
