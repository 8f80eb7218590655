use metrics::counter;
use tracing::{info, warn};

use crate::domain::articles::{Article, ArticleStatus};
use crate::domain::error::{DomainError, ensure_non_empty};

use super::queries::{enrich_author, still_published};
use super::service::ArticleService;
use super::types::{ArticleError, PublishMode, deny_unaffected};

const TARGET: &str = "lectern::application::articles";
const METRIC_PUBLISH_RETRY: &str = "lectern_publish_retry_total";

impl ArticleService {
    /// Create or edit a draft. Only the owning author may edit an existing draft.
    pub async fn save_draft(&self, mut article: Article) -> Result<i64, ArticleError> {
        validate_draft(&article)?;
        article.status = ArticleStatus::Draft;

        let id = self.write_draft(&article).await?;
        self.invalidate(id, article.author.id, false).await?;
        Ok(id)
    }

    /// Mark the article published and mirror it into the published store.
    pub async fn publish(&self, mut article: Article) -> Result<i64, ArticleError> {
        validate_draft(&article)?;
        article.status = ArticleStatus::Published;
        let author_id = article.author.id;

        let id = match self.config.mode {
            PublishMode::Transactional => self
                .store
                .sync(&article)
                .await
                .map_err(deny_unaffected(article.id))?,
            PublishMode::Split => self.publish_split(&mut article).await?,
        };

        self.invalidate(id, author_id, true).await?;

        info!(
            target = TARGET,
            article_id = id,
            author_id,
            mode = ?self.config.mode,
            "Article published"
        );

        self.schedule_public_prewarm(id);
        Ok(id)
    }

    /// Hide a published article from readers without deleting it.
    pub async fn withdraw(&self, id: i64, requester_id: i64) -> Result<(), ArticleError> {
        self.store
            .sync_status(id, requester_id, ArticleStatus::Private)
            .await
            .map_err(deny_unaffected(id))?;

        self.invalidate(id, requester_id, true).await?;
        // A fill that read the copy before the status change may still land.
        self.write_back.flush().await;
        self.cache.delete_public_detail(id).await?;

        info!(
            target = TARGET,
            article_id = id,
            author_id = requester_id,
            "Article withdrawn"
        );
        Ok(())
    }

    async fn write_draft(&self, article: &Article) -> Result<i64, ArticleError> {
        if article.is_new() {
            return Ok(self.store.insert(article).await?);
        }
        self.store
            .update_by_id(article)
            .await
            .map_err(deny_unaffected(article.id))?;
        Ok(article.id)
    }

    async fn publish_split(&self, article: &mut Article) -> Result<i64, ArticleError> {
        let id = self.write_draft(article).await?;
        article.id = id;

        let attempts = self.config.publish_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.upsert_published(article).await {
                Ok(()) => return Ok(id),
                Err(err) => {
                    counter!(METRIC_PUBLISH_RETRY).increment(1);
                    warn!(
                        target = TARGET,
                        article_id = id,
                        attempt,
                        attempts,
                        error = %err,
                        "Published copy write failed"
                    );
                    if attempt >= attempts {
                        // The draft stays written; drop views that may show the old one.
                        if let Err(invalidate_err) =
                            self.invalidate(id, article.author.id, false).await
                        {
                            warn!(
                                target = TARGET,
                                article_id = id,
                                error = %invalidate_err,
                                "Draft view invalidation failed after published copy failure"
                            );
                        }
                        return Err(ArticleError::PublishedCopy {
                            id,
                            attempts,
                            source: err,
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Drop the detail and first-page entries, and the public detail when `public`.
    ///
    /// Every delete is attempted; the first failure is returned.
    async fn invalidate(&self, id: i64, author_id: i64, public: bool) -> Result<(), ArticleError> {
        let mut results = vec![
            self.cache.delete_detail(id).await,
            self.cache.delete_first_page(author_id).await,
        ];
        if public {
            results.push(self.cache.delete_public_detail(id).await);
        }
        for result in &results {
            if let Err(err) = result {
                warn!(target = TARGET, article_id = id, author_id, error = %err, "Cache invalidation failed");
            }
        }
        results.into_iter().collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }

    fn schedule_public_prewarm(&self, id: i64) {
        let store = self.store.clone();
        let users = self.users.clone();
        let cache = self.cache.clone();
        self.write_back.spawn("public_detail_prewarm", async move {
            let Some(mut article) = store.get_published_by_id(id).await? else {
                return Ok(());
            };
            if !article.status.is_public() {
                return Ok(());
            }
            if enrich_author(users.as_ref(), &mut article).await
                && still_published(store.as_ref(), &article).await?
            {
                cache.set_public_detail(&article).await?;
            }
            Ok::<(), ArticleError>(())
        });
    }
}

fn validate_draft(article: &Article) -> Result<(), ArticleError> {
    if article.author.id <= 0 {
        return Err(DomainError::validation("`author.id` must be positive").into());
    }
    if article.id < 0 {
        return Err(DomainError::validation("`id` must not be negative").into());
    }
    ensure_non_empty(&article.title, "title")?;
    Ok(())
}
