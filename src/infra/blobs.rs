//! Blob-augmented article storage.
//!
//! [`BlobBackedStore`] wraps any [`ArticleStore`] and mirrors published
//! bodies into a [`BlobStore`] after the wrapped write commits. Blob
//! failures are logged and never undo the store write.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::application::repos::{ArticleStore, BlobError, BlobStore, RepoError};
use crate::domain::articles::{Article, ArticleStatus, AuthorPage};

const TARGET: &str = "lectern::infra::blobs";

/// Object key of an article body.
pub fn article_blob_key(id: i64) -> String {
    format!("articles/{id}")
}

/// Filesystem-backed object storage.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let absolute = self.resolve(key)?;
        Ok(fs::read(absolute).await?)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), BlobError> {
        let absolute = self.resolve(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&absolute).await?;
        file.write_all(body).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let absolute = self.resolve(key)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::Io(err)),
        }
    }
}

#[derive(Clone)]
pub struct BlobBackedStore {
    inner: Arc<dyn ArticleStore>,
    blobs: Arc<dyn BlobStore>,
}

impl BlobBackedStore {
    pub fn new(inner: Arc<dyn ArticleStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { inner, blobs }
    }

    async fn mirror_body(&self, id: i64, article: &Article) {
        let key = article_blob_key(id);
        match self.blobs.put(&key, article.content.as_bytes()).await {
            Ok(()) => debug!(target = TARGET, article_id = id, "Article body stored"),
            Err(err) => warn!(
                target = TARGET,
                article_id = id,
                error = %err,
                "Failed to store article body"
            ),
        }
    }
}

#[async_trait]
impl ArticleStore for BlobBackedStore {
    async fn insert(&self, article: &Article) -> Result<i64, RepoError> {
        self.inner.insert(article).await
    }

    async fn update_by_id(&self, article: &Article) -> Result<(), RepoError> {
        self.inner.update_by_id(article).await
    }

    async fn sync(&self, article: &Article) -> Result<i64, RepoError> {
        let id = self.inner.sync(article).await?;
        self.mirror_body(id, article).await;
        Ok(id)
    }

    async fn sync_status(
        &self,
        id: i64,
        author_id: i64,
        status: ArticleStatus,
    ) -> Result<(), RepoError> {
        self.inner.sync_status(id, author_id, status).await?;
        if status == ArticleStatus::Private {
            if let Err(err) = self.blobs.delete(&article_blob_key(id)).await {
                warn!(
                    target = TARGET,
                    article_id = id,
                    error = %err,
                    "Failed to remove withdrawn article body"
                );
            }
        }
        Ok(())
    }

    async fn upsert_published(&self, article: &Article) -> Result<(), RepoError> {
        self.inner.upsert_published(article).await?;
        self.mirror_body(article.id, article).await;
        Ok(())
    }

    async fn get_by_author(
        &self,
        author_id: i64,
        page: AuthorPage,
    ) -> Result<Vec<Article>, RepoError> {
        self.inner.get_by_author(author_id, page).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        self.inner.get_by_id(id).await
    }

    async fn get_published_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        self.inner.get_published_by_id(id).await
    }
}
