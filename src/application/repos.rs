//! Repository traits describing persistence adapters.
//!
//! Every backend (Postgres, in-memory, blob-augmented) implements the same
//! capability set; engines receive them as `Arc<dyn Trait>` chosen at
//! construction time.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::articles::{Article, ArticleStatus, AuthorPage};
use crate::domain::interactions::{CollectionRecord, Interactive, LikeRecord};
use crate::domain::users::UserProfile;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    /// The statement ran but matched no row (e.g. an ownership filter excluded it).
    #[error("no rows affected")]
    Unaffected,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Draft + published article storage.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert a new draft; the store assigns id and timestamps.
    async fn insert(&self, article: &Article) -> Result<i64, RepoError>;

    /// Update title, content and status of the draft `(id, author)`.
    ///
    /// Returns [`RepoError::Unaffected`] when no draft with that id belongs to the author.
    async fn update_by_id(&self, article: &Article) -> Result<(), RepoError>;

    /// Upsert the draft and mirror it into the published store as one unit.
    async fn sync(&self, article: &Article) -> Result<i64, RepoError>;

    /// Set the status of the draft `(id, author)` and of its published copy.
    async fn sync_status(
        &self,
        id: i64,
        author_id: i64,
        status: ArticleStatus,
    ) -> Result<(), RepoError>;

    /// Insert or overwrite the published copy of `article.id` (last writer wins).
    async fn upsert_published(&self, article: &Article) -> Result<(), RepoError>;

    /// Author's drafts, most recently updated first.
    async fn get_by_author(
        &self,
        author_id: i64,
        page: AuthorPage,
    ) -> Result<Vec<Article>, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>, RepoError>;

    async fn get_published_by_id(&self, id: i64) -> Result<Option<Article>, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollectionItem {
    pub biz: String,
    pub biz_id: i64,
    pub uid: i64,
    pub collection_id: i64,
}

/// Durable interaction aggregates and per-user records.
///
/// Counter columns are only ever changed with single-statement
/// "insert; on conflict increment" upserts, never read-modify-write.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn incr_read_cnt(&self, biz: &str, biz_id: i64) -> Result<(), RepoError>;

    /// Mark `(biz, biz_id, uid)` liked. Returns `true` when the state changed
    /// and the aggregate like counter was incremented.
    async fn insert_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError>;

    /// Mark `(biz, biz_id, uid)` unliked. Returns `true` when the state changed
    /// and the aggregate like counter was decremented.
    async fn cancel_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError>;

    /// Append a collection record. Returns `false` when the same folder already holds the item.
    async fn insert_collection(&self, item: &NewCollectionItem) -> Result<bool, RepoError>;

    async fn get_like(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<LikeRecord>, RepoError>;

    async fn get_collection(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<CollectionRecord>, RepoError>;

    async fn get_interactive(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<Interactive>, RepoError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, RepoError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Object storage for article bodies.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError>;

    /// Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}
