use tracing::{debug, warn};

use crate::application::repos::{ArticleStore, UserDirectory};
use crate::domain::articles::{Article, AuthorPage};

use super::service::ArticleService;
use super::types::ArticleError;

const TARGET: &str = "lectern::application::articles";

impl ArticleService {
    /// Draft-side detail, read through the detail cache.
    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleError> {
        match self.cache.get_detail(id).await {
            Ok(Some(article)) => return Ok(article),
            Ok(None) => {}
            Err(err) => {
                warn!(target = TARGET, article_id = id, error = %err, "Detail cache read failed");
            }
        }

        let article = self.store.get_by_id(id).await?.ok_or(ArticleError::NotFound)?;

        let cache = self.cache.clone();
        let cached = article.clone();
        self.write_back.spawn("detail_fill", async move {
            cache.set_detail(&cached).await
        });
        Ok(article)
    }

    /// Reader-facing detail with the author's display name.
    ///
    /// When the name cannot be resolved the article is still returned, with an
    /// empty name, and is not cached.
    pub async fn get_published_by_id(&self, id: i64) -> Result<Article, ArticleError> {
        match self.cache.get_public_detail(id).await {
            Ok(Some(article)) if article.status.is_public() => return Ok(article),
            Ok(_) => {}
            Err(err) => {
                warn!(target = TARGET, article_id = id, error = %err, "Public detail cache read failed");
            }
        }

        let mut article = self
            .store
            .get_published_by_id(id)
            .await?
            .filter(|article| article.status.is_public())
            .ok_or(ArticleError::NotFound)?;

        if enrich_author(self.users.as_ref(), &mut article).await {
            let store = self.store.clone();
            let cache = self.cache.clone();
            let cached = article.clone();
            self.write_back.spawn("public_detail_fill", async move {
                if still_published(store.as_ref(), &cached).await? {
                    cache.set_public_detail(&cached).await?;
                }
                Ok::<(), ArticleError>(())
            });
        }
        Ok(article)
    }

    /// The cached first page of `author_id`.
    ///
    /// A miss, or an unreachable cache, is [`ArticleError::NotFound`]: callers
    /// fall back to [`ArticleService::list_by_author`].
    pub async fn first_page(&self, author_id: i64) -> Result<Vec<Article>, ArticleError> {
        match self.cache.get_first_page(author_id).await {
            Ok(Some(articles)) => Ok(articles),
            Ok(None) => Err(ArticleError::NotFound),
            Err(err) => {
                warn!(target = TARGET, author_id, error = %err, "First page cache read failed");
                Err(ArticleError::NotFound)
            }
        }
    }

    /// An author's drafts. The first-page shape is served from cache when
    /// possible; everything else goes to the store.
    pub async fn list_by_author(
        &self,
        author_id: i64,
        page: AuthorPage,
    ) -> Result<Vec<Article>, ArticleError> {
        if self.cache.is_first_page(page) {
            if let Ok(articles) = self.first_page(author_id).await {
                return Ok(articles);
            }
        }

        let articles = self.store.get_by_author(author_id, page).await?;
        self.precache_first(&articles);
        if let Some(view) = self.first_page_view(page, &articles) {
            let cache = self.cache.clone();
            let view = view.to_vec();
            self.write_back.spawn("first_page_fill", async move {
                cache.set_first_page(author_id, &view).await
            });
        }
        Ok(articles)
    }

    /// Readers usually open the newest article right after listing.
    fn precache_first(&self, articles: &[Article]) {
        let Some(first) = articles.first() else {
            return;
        };
        if !self.cache.fits_precache(first) {
            debug!(target = TARGET, article_id = first.id, "Skipping pre-cache of large body");
            return;
        }
        let cache = self.cache.clone();
        let first = first.clone();
        self.write_back.spawn("detail_precache", async move {
            cache.set_detail(&first).await
        });
    }

    /// The part of a listing that equals the author's first page, if any.
    fn first_page_view<'a>(&self, page: AuthorPage, articles: &'a [Article]) -> Option<&'a [Article]> {
        if page.offset != 0 {
            return None;
        }
        let size = self.cache.first_page().limit as usize;
        if articles.len() >= size {
            Some(&articles[..size])
        } else if articles.len() < page.limit as usize {
            // The listing ran out before its limit: it holds every article.
            Some(articles)
        } else {
            None
        }
    }
}

/// Whether the published copy in the store still matches `article`.
///
/// Checked right before a public-detail write so a withdraw or republish that
/// committed in the meantime is not overwritten with the stale copy.
pub(super) async fn still_published(
    store: &dyn ArticleStore,
    article: &Article,
) -> Result<bool, ArticleError> {
    Ok(store
        .get_published_by_id(article.id)
        .await?
        .is_some_and(|current| {
            current.status.is_public() && current.updated_at == article.updated_at
        }))
}

/// Fill in the author's display name. Returns `false` when it could not be resolved.
pub(super) async fn enrich_author(users: &dyn UserDirectory, article: &mut Article) -> bool {
    match users.find_by_id(article.author.id).await {
        Ok(Some(profile)) => {
            article.author.name = profile.nickname;
            true
        }
        Ok(None) => {
            warn!(
                target = TARGET,
                article_id = article.id,
                author_id = article.author.id,
                "Author lookup found no user"
            );
            false
        }
        Err(err) => {
            warn!(
                target = TARGET,
                article_id = article.id,
                author_id = article.author.id,
                error = %err,
                "Author lookup failed"
            );
            false
        }
    }
}
