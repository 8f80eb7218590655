use thiserror::Error;

use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;

const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("requester may not modify article {id}")]
    PermissionDenied { id: i64 },
    #[error("article not found")]
    NotFound,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The draft was written but its published copy could not be.
    #[error("published copy of article {id} failed after {attempts} attempts")]
    PublishedCopy {
        id: i64,
        attempts: u32,
        #[source]
        source: RepoError,
    },
}

/// How `publish` writes the draft and its published copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishMode {
    /// Both rows in one store transaction.
    #[default]
    Transactional,
    /// Draft first, then the published copy with bounded retries; a failed
    /// copy leaves the draft in place.
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleServiceConfig {
    pub mode: PublishMode,
    pub publish_attempts: u32,
}

impl Default for ArticleServiceConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::default(),
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
        }
    }
}

impl From<&crate::config::StoreSettings> for ArticleServiceConfig {
    fn from(settings: &crate::config::StoreSettings) -> Self {
        Self {
            mode: settings.publish_mode,
            publish_attempts: settings.publish_attempts.get(),
        }
    }
}

/// Treat a "no rows affected" store reply on an ownership-gated write as a denial.
pub(super) fn deny_unaffected(id: i64) -> impl FnOnce(RepoError) -> ArticleError {
    move |err| match err {
        RepoError::Unaffected => ArticleError::PermissionDenied { id },
        other => ArticleError::Repo(other),
    }
}
