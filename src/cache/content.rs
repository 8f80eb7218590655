//! Content cache: article detail, public detail and an author's first page.
//!
//! Entries are JSON-encoded [`Article`]s with the configured content TTL.
//! A miss only means "consult the primary store", never "does not exist".

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::articles::{Article, AuthorPage};

use super::backend::KvCache;
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys;

const METRIC_CONTENT_HIT: &str = "lectern_content_cache_hit_total";
const METRIC_CONTENT_MISS: &str = "lectern_content_cache_miss_total";

#[derive(Clone)]
pub struct ArticleCache {
    kv: Arc<dyn KvCache>,
    config: CacheConfig,
}

impl ArticleCache {
    pub fn new(kv: Arc<dyn KvCache>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The listing shape served from the first-page cache.
    pub fn first_page(&self) -> AuthorPage {
        AuthorPage::new(self.config.first_page_size, 0)
    }

    pub fn is_first_page(&self, page: AuthorPage) -> bool {
        page == self.first_page()
    }

    /// Whether a body is small enough to pre-cache after a listing query.
    pub fn fits_precache(&self, article: &Article) -> bool {
        article.content.len() < self.config.precache_max_bytes
    }

    pub async fn get_detail(&self, id: i64) -> Result<Option<Article>, CacheError> {
        self.load("detail", &keys::article_detail(id)).await
    }

    pub async fn set_detail(&self, article: &Article) -> Result<(), CacheError> {
        self.store(&keys::article_detail(article.id), article).await
    }

    pub async fn delete_detail(&self, id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::article_detail(id)).await
    }

    pub async fn get_public_detail(&self, id: i64) -> Result<Option<Article>, CacheError> {
        self.load("public_detail", &keys::article_public_detail(id))
            .await
    }

    pub async fn set_public_detail(&self, article: &Article) -> Result<(), CacheError> {
        self.store(&keys::article_public_detail(article.id), article)
            .await
    }

    pub async fn delete_public_detail(&self, id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::article_public_detail(id)).await
    }

    pub async fn get_first_page(&self, author_id: i64) -> Result<Option<Vec<Article>>, CacheError> {
        self.load("first_page", &keys::article_first_page(author_id))
            .await
    }

    /// Cache a first page; bodies are reduced to their abstracts.
    pub async fn set_first_page(
        &self,
        author_id: i64,
        articles: &[Article],
    ) -> Result<(), CacheError> {
        let page: Vec<Article> = articles
            .iter()
            .map(|article| Article {
                content: article.abstract_text(),
                ..article.clone()
            })
            .collect();
        self.store(&keys::article_first_page(author_id), &page)
            .await
    }

    pub async fn delete_first_page(&self, author_id: i64) -> Result<(), CacheError> {
        self.kv.delete(&keys::article_first_page(author_id)).await
    }

    async fn load<T: DeserializeOwned>(
        &self,
        entry: &'static str,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self.kv.get(key).await? {
            Some(raw) => {
                counter!(METRIC_CONTENT_HIT, "entry" => entry).increment(1);
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            None => {
                counter!(METRIC_CONTENT_MISS, "entry" => entry).increment(1);
                Ok(None)
            }
        }
    }

    async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_vec(value)?;
        self.kv.set(key, raw, Some(self.config.content_ttl)).await
    }
}
