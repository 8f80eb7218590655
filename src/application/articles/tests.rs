use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::*;
use crate::application::repos::{ArticleStore, RepoError, UserDirectory};
use crate::application::write_back::WriteBack;
use crate::cache::{
    ArticleCache, AtomicScript, CacheConfig, CacheError, KeyTtl, KvCache, MemoryCache, keys,
};
use crate::domain::articles::{Article, ArticleStatus, AuthorPage};
use crate::domain::users::UserProfile;
use crate::infra::memory::MemoryRepositories;

struct Fixture {
    store: Arc<MemoryRepositories>,
    kv: Arc<MemoryCache>,
    service: ArticleService,
}

impl Fixture {
    fn new(config: ArticleServiceConfig) -> Self {
        let store = Arc::new(MemoryRepositories::new());
        let kv = Arc::new(MemoryCache::new());
        let service = ArticleService::new(
            store.clone(),
            store.clone(),
            ArticleCache::new(kv.clone(), CacheConfig::default()),
            WriteBack::default(),
            config,
        );
        Self { store, kv, service }
    }

    fn split(attempts: u32) -> Self {
        Self::new(ArticleServiceConfig {
            mode: PublishMode::Split,
            publish_attempts: attempts,
        })
    }

    async fn settle(&self) {
        self.service.write_back().flush().await;
    }

    async fn cached(&self, key: &str) -> bool {
        self.kv.get(key).await.unwrap().is_some()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new(ArticleServiceConfig::default())
    }
}

/// Every call fails as if the cache host were unreachable.
struct UnreachableCache;

#[async_trait]
impl KvCache for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Timeout { op: "get" })
    }

    async fn set(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Err(CacheError::Timeout { op: "set" })
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Timeout { op: "delete" })
    }

    async fn run_script(
        &self,
        _script: &AtomicScript,
        _keys: &[String],
        _args: &[String],
    ) -> Result<i64, CacheError> {
        Err(CacheError::Timeout { op: "evalsha" })
    }

    async fn hash_get_all(&self, _key: &str) -> Result<HashMap<String, String>, CacheError> {
        Err(CacheError::Timeout { op: "hgetall" })
    }

    async fn hash_set(&self, _key: &str, _fields: &[(String, String)]) -> Result<(), CacheError> {
        Err(CacheError::Timeout { op: "hset" })
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Timeout { op: "expire" })
    }

    async fn ttl(&self, _key: &str) -> Result<KeyTtl, CacheError> {
        Err(CacheError::Timeout { op: "ttl" })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Timeout { op: "ping" })
    }
}

/// Author lookups that park until released, to interleave a withdraw.
struct GatedUsers {
    inner: Arc<MemoryRepositories>,
    entered: Notify,
    release: Notify,
}

impl GatedUsers {
    fn new(inner: Arc<MemoryRepositories>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl UserDirectory for GatedUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, RepoError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.find_by_id(id).await
    }
}

/// Memory cache whose detail deletes fail.
#[derive(Default)]
struct DetailDeletesFail(MemoryCache);

#[async_trait]
impl KvCache for DetailDeletesFail {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.0.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if key.starts_with("article:detail:") {
            return Err(CacheError::Timeout { op: "delete" });
        }
        self.0.delete(key).await
    }

    async fn run_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, CacheError> {
        self.0.run_script(script, keys, args).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.0.hash_get_all(key).await
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        self.0.hash_set(key, fields).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.0.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheError> {
        self.0.ttl(key).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.0.ping().await
    }
}

fn service_over(
    store: Arc<MemoryRepositories>,
    users: Arc<dyn UserDirectory>,
    kv: Arc<dyn KvCache>,
    config: ArticleServiceConfig,
) -> ArticleService {
    ArticleService::new(
        store,
        users,
        ArticleCache::new(kv, CacheConfig::default()),
        WriteBack::default(),
        config,
    )
}

async fn wait_until_private(store: &MemoryRepositories, id: i64) {
    loop {
        let copy = store.get_published_by_id(id).await.unwrap();
        if copy.is_some_and(|copy| copy.status == ArticleStatus::Private) {
            return;
        }
        tokio::task::yield_now().await;
    }
}

fn edit(id: i64, author_id: i64, title: &str) -> Article {
    Article {
        id,
        ..Article::draft(author_id, title, format!("{title} body"))
    }
}

#[tokio::test]
async fn save_draft_creates_then_edits() {
    let fx = Fixture::default();

    let id = fx
        .service
        .save_draft(Article::draft(7, "first", "body"))
        .await
        .unwrap();
    assert_eq!(id, 1);

    let again = fx.service.save_draft(edit(id, 7, "second")).await.unwrap();
    assert_eq!(again, id);

    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "second");
    assert_eq!(stored.status, ArticleStatus::Draft);
    assert!(fx.store.get_published_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
async fn save_draft_by_another_author_is_denied() {
    let fx = Fixture::default();
    let id = fx
        .service
        .save_draft(Article::draft(7, "mine", "body"))
        .await
        .unwrap();

    let err = fx.service.save_draft(edit(id, 8, "theirs")).await.unwrap_err();
    assert!(matches!(err, ArticleError::PermissionDenied { id: denied } if denied == id));

    let stored = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "mine");
}

#[tokio::test]
async fn drafts_need_a_title_and_an_author() {
    let fx = Fixture::default();

    let err = fx
        .service
        .save_draft(Article::draft(7, "  ", "body"))
        .await
        .unwrap_err();
    assert!(matches!(err, ArticleError::Domain(_)));

    let err = fx
        .service
        .publish(Article::draft(0, "title", "body"))
        .await
        .unwrap_err();
    assert!(matches!(err, ArticleError::Domain(_)));
}

#[tokio::test]
async fn publish_writes_draft_and_published_copy() {
    let fx = Fixture::default();

    let id = fx
        .service
        .publish(Article::draft(7, "hello", "world"))
        .await
        .unwrap();
    assert_eq!(id, 1);

    let draft = fx.store.get_by_id(id).await.unwrap().unwrap();
    let published = fx.store.get_published_by_id(id).await.unwrap().unwrap();
    assert_eq!(draft.status, ArticleStatus::Published);
    assert_eq!(published.status, ArticleStatus::Published);
    assert_eq!(published.title, "hello");
    assert_eq!(published.content, "world");
}

#[tokio::test]
async fn transactional_publish_is_all_or_nothing() {
    let fx = Fixture::default();
    let id = fx
        .service
        .save_draft(Article::draft(7, "v1", "body"))
        .await
        .unwrap();

    fx.store.fail_published_writes(1);
    let err = fx.service.publish(edit(id, 7, "v2")).await.unwrap_err();
    assert!(matches!(err, ArticleError::Repo(_)));

    let draft = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(draft.title, "v1");
    assert_eq!(draft.status, ArticleStatus::Draft);
    assert!(fx.store.get_published_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
async fn publish_by_another_author_is_denied() {
    let fx = Fixture::default();
    let id = fx
        .service
        .publish(Article::draft(7, "mine", "body"))
        .await
        .unwrap();

    let err = fx.service.publish(edit(id, 8, "hijack")).await.unwrap_err();
    assert!(matches!(err, ArticleError::PermissionDenied { .. }));

    let published = fx.store.get_published_by_id(id).await.unwrap().unwrap();
    assert_eq!(published.title, "mine");
}

#[tokio::test]
async fn split_publish_retries_the_published_copy() {
    let fx = Fixture::split(3);
    fx.store.fail_published_writes(2);

    let id = fx
        .service
        .publish(Article::draft(7, "retry", "body"))
        .await
        .unwrap();

    let published = fx.store.get_published_by_id(id).await.unwrap().unwrap();
    assert_eq!(published.title, "retry");
}

#[tokio::test]
async fn split_publish_keeps_the_draft_when_retries_run_out() {
    let fx = Fixture::split(3);
    let id = fx
        .service
        .save_draft(Article::draft(7, "v1", "body"))
        .await
        .unwrap();
    fx.store.fail_published_writes(3);

    let err = fx.service.publish(edit(id, 7, "v2")).await.unwrap_err();
    match err {
        ArticleError::PublishedCopy {
            id: failed,
            attempts,
            ..
        } => {
            assert_eq!(failed, id);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let draft = fx.store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(draft.title, "v2");
    assert!(fx.store.get_published_by_id(id).await.unwrap().is_none());
    assert!(!fx.cached(&keys::article_detail(id)).await);
}

#[tokio::test]
async fn publish_prewarms_the_public_detail() {
    let fx = Fixture::default();
    fx.store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });

    let id = fx
        .service
        .publish(Article::draft(7, "warm", "body"))
        .await
        .unwrap();
    fx.settle().await;
    assert!(fx.cached(&keys::article_public_detail(id)).await);

    let warm = fx.service.get_published_by_id(id).await.unwrap();
    assert_eq!(warm.author.name, "ada");
    assert_eq!(warm.title, "warm");
}

#[tokio::test]
async fn cold_and_warm_public_reads_agree() {
    let fx = Fixture::default();
    fx.store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });
    let id = fx
        .service
        .publish(Article::draft(7, "same", "body"))
        .await
        .unwrap();
    fx.settle().await;
    fx.kv
        .delete(&keys::article_public_detail(id))
        .await
        .unwrap();

    let cold = fx.service.get_published_by_id(id).await.unwrap();
    fx.settle().await;
    assert!(fx.cached(&keys::article_public_detail(id)).await);
    let warm = fx.service.get_published_by_id(id).await.unwrap();

    assert_eq!(cold, warm);
}

#[tokio::test]
async fn unresolved_author_is_served_but_not_cached() {
    let fx = Fixture::default();
    let id = fx
        .service
        .publish(Article::draft(7, "anonymous", "body"))
        .await
        .unwrap();
    fx.settle().await;
    assert!(!fx.cached(&keys::article_public_detail(id)).await);

    let article = fx.service.get_published_by_id(id).await.unwrap();
    fx.settle().await;
    assert_eq!(article.author.name, "");
    assert!(!fx.cached(&keys::article_public_detail(id)).await);
}

#[tokio::test]
async fn withdrawn_articles_are_hidden_from_readers() {
    let fx = Fixture::default();
    fx.store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });
    let id = fx
        .service
        .publish(Article::draft(7, "gone soon", "body"))
        .await
        .unwrap();
    fx.settle().await;
    fx.service.get_published_by_id(id).await.unwrap();

    fx.service.withdraw(id, 7).await.unwrap();

    assert!(!fx.cached(&keys::article_public_detail(id)).await);
    assert!(matches!(
        fx.service.get_published_by_id(id).await,
        Err(ArticleError::NotFound)
    ));
    let draft = fx.service.get_by_id(id).await.unwrap();
    assert_eq!(draft.status, ArticleStatus::Private);
}

#[tokio::test]
async fn withdraw_by_another_author_is_denied() {
    let fx = Fixture::default();
    let id = fx
        .service
        .publish(Article::draft(7, "stays", "body"))
        .await
        .unwrap();

    let err = fx.service.withdraw(id, 8).await.unwrap_err();
    assert!(matches!(err, ArticleError::PermissionDenied { .. }));

    let published = fx.store.get_published_by_id(id).await.unwrap().unwrap();
    assert_eq!(published.status, ArticleStatus::Published);
}

#[tokio::test]
async fn unknown_articles_are_not_found() {
    let fx = Fixture::default();
    assert!(matches!(
        fx.service.get_by_id(42).await,
        Err(ArticleError::NotFound)
    ));
    assert!(matches!(
        fx.service.get_published_by_id(42).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn edits_invalidate_the_cached_detail() {
    let fx = Fixture::default();
    let id = fx
        .service
        .save_draft(Article::draft(7, "before", "body"))
        .await
        .unwrap();

    fx.service.get_by_id(id).await.unwrap();
    fx.settle().await;
    assert!(fx.cached(&keys::article_detail(id)).await);

    fx.service.save_draft(edit(id, 7, "after")).await.unwrap();
    assert!(!fx.cached(&keys::article_detail(id)).await);
    assert_eq!(fx.service.get_by_id(id).await.unwrap().title, "after");
}

#[tokio::test]
async fn first_page_listing_fills_the_cache() {
    let fx = Fixture::default();
    for n in 0..3 {
        fx.service
            .save_draft(Article::draft(7, format!("post {n}"), "body"))
            .await
            .unwrap();
    }
    assert!(matches!(
        fx.service.first_page(7).await,
        Err(ArticleError::NotFound)
    ));

    let listed = fx
        .service
        .list_by_author(7, AuthorPage::new(100, 0))
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
    fx.settle().await;

    let cached = fx.service.first_page(7).await.unwrap();
    let cached_ids: Vec<i64> = cached.iter().map(|a| a.id).collect();
    let listed_ids: Vec<i64> = listed.iter().map(|a| a.id).collect();
    assert_eq!(cached_ids, listed_ids);
    assert!(matches!(
        fx.service.first_page(8).await,
        Err(ArticleError::NotFound)
    ));

    fx.service
        .save_draft(Article::draft(7, "newest", "body"))
        .await
        .unwrap();
    assert!(matches!(
        fx.service.first_page(7).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn offset_listings_are_not_cached_as_first_page() {
    let fx = Fixture::default();
    for n in 0..3 {
        fx.service
            .save_draft(Article::draft(7, format!("post {n}"), "body"))
            .await
            .unwrap();
    }

    let listed = fx
        .service
        .list_by_author(7, AuthorPage::new(10, 1))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    fx.settle().await;

    assert!(matches!(
        fx.service.first_page(7).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn listing_precaches_the_newest_article() {
    let fx = Fixture::default();
    fx.service
        .save_draft(Article::draft(7, "older", "body"))
        .await
        .unwrap();
    let newest = fx
        .service
        .save_draft(Article::draft(7, "newer", "body"))
        .await
        .unwrap();

    let listed = fx
        .service
        .list_by_author(7, AuthorPage::new(10, 0))
        .await
        .unwrap();
    assert_eq!(listed[0].id, newest);
    fx.settle().await;

    assert!(fx.cached(&keys::article_detail(newest)).await);
}

#[tokio::test]
async fn large_bodies_are_not_precached() {
    let fx = Fixture::default();
    let body = "x".repeat(CacheConfig::default().precache_max_bytes);
    let id = fx
        .service
        .save_draft(Article::draft(7, "huge", body))
        .await
        .unwrap();

    fx.service
        .list_by_author(7, AuthorPage::new(10, 0))
        .await
        .unwrap();
    fx.settle().await;

    assert!(!fx.cached(&keys::article_detail(id)).await);
}

#[tokio::test]
async fn reads_survive_an_unreachable_cache() {
    let store = Arc::new(MemoryRepositories::new());
    store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });
    let id = store
        .sync(&Article {
            status: ArticleStatus::Published,
            ..Article::draft(7, "durable", "body")
        })
        .await
        .unwrap();

    let service = ArticleService::new(
        store.clone(),
        store.clone(),
        ArticleCache::new(Arc::new(UnreachableCache), CacheConfig::default()),
        WriteBack::default(),
        ArticleServiceConfig::default(),
    );

    assert_eq!(service.get_by_id(id).await.unwrap().title, "durable");
    assert_eq!(
        service.get_published_by_id(id).await.unwrap().author.name,
        "ada"
    );
    let listed = service
        .list_by_author(7, AuthorPage::new(100, 0))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(matches!(
        service.first_page(7).await,
        Err(ArticleError::NotFound)
    ));
    service.write_back().flush().await;

    // Writes reach the store, but a failed invalidation is reported.
    let err = service.save_draft(edit(id, 7, "edited")).await.unwrap_err();
    assert!(matches!(err, ArticleError::Cache(_)));
    assert_eq!(store.get_by_id(id).await.unwrap().unwrap().title, "edited");
}

#[tokio::test]
async fn prewarm_racing_a_withdraw_does_not_cache_the_old_copy() {
    let store = Arc::new(MemoryRepositories::new());
    store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });
    let users = Arc::new(GatedUsers::new(store.clone()));
    let kv = Arc::new(MemoryCache::new());
    let service = service_over(
        store.clone(),
        users.clone(),
        kv.clone(),
        ArticleServiceConfig::default(),
    );

    let id = service
        .publish(Article::draft(7, "short lived", "body"))
        .await
        .unwrap();
    // The pre-warm has read the published copy and is resolving the author.
    users.entered.notified().await;

    let (withdrawn, ()) = tokio::join!(service.withdraw(id, 7), async {
        wait_until_private(&store, id).await;
        users.release.notify_one();
    });
    withdrawn.unwrap();
    service.write_back().flush().await;

    assert!(kv.get(&keys::article_public_detail(id)).await.unwrap().is_none());
    assert!(matches!(
        service.get_published_by_id(id).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn public_fill_racing_a_withdraw_does_not_cache_the_old_copy() {
    let store = Arc::new(MemoryRepositories::new());
    store.insert_user(UserProfile {
        id: 7,
        nickname: "ada".to_string(),
    });
    let id = store
        .sync(&Article {
            status: ArticleStatus::Published,
            ..Article::draft(7, "short lived", "body")
        })
        .await
        .unwrap();
    let users = Arc::new(GatedUsers::new(store.clone()));
    let kv = Arc::new(MemoryCache::new());
    let service = service_over(
        store.clone(),
        users.clone(),
        kv.clone(),
        ArticleServiceConfig::default(),
    );

    let (read, ()) = tokio::join!(service.get_published_by_id(id), async {
        users.entered.notified().await;
        service.withdraw(id, 7).await.unwrap();
        users.release.notify_one();
    });
    // The in-flight read saw the copy before the withdraw.
    assert_eq!(read.unwrap().status, ArticleStatus::Published);
    service.write_back().flush().await;

    assert!(kv.get(&keys::article_public_detail(id)).await.unwrap().is_none());
    assert!(matches!(
        service.get_published_by_id(id).await,
        Err(ArticleError::NotFound)
    ));
}

#[tokio::test]
async fn failed_detail_delete_still_drops_the_other_entries() {
    let store = Arc::new(MemoryRepositories::new());
    let kv = Arc::new(DetailDeletesFail::default());
    let service = service_over(
        store.clone(),
        store.clone(),
        kv.clone(),
        ArticleServiceConfig::default(),
    );

    let id = store
        .sync(&Article {
            status: ArticleStatus::Published,
            ..Article::draft(7, "cached", "body")
        })
        .await
        .unwrap();
    service
        .list_by_author(7, AuthorPage::new(100, 0))
        .await
        .unwrap();
    service.write_back().flush().await;
    assert!(kv.get(&keys::article_first_page(7)).await.unwrap().is_some());
    kv.set(&keys::article_public_detail(id), b"{}".to_vec(), None)
        .await
        .unwrap();

    let err = service.withdraw(id, 7).await.unwrap_err();
    assert!(matches!(err, ArticleError::Cache(_)));
    assert!(kv.get(&keys::article_first_page(7)).await.unwrap().is_none());
    assert!(kv.get(&keys::article_public_detail(id)).await.unwrap().is_none());
}

#[tokio::test]
async fn exhausted_split_publish_reports_the_copy_failure() {
    let store = Arc::new(MemoryRepositories::new());
    let service = service_over(
        store.clone(),
        store.clone(),
        Arc::new(DetailDeletesFail::default()),
        ArticleServiceConfig {
            mode: PublishMode::Split,
            publish_attempts: 3,
        },
    );
    store.fail_published_writes(3);

    let err = service
        .publish(Article::draft(7, "unlucky", "body"))
        .await
        .unwrap_err();
    assert!(matches!(err, ArticleError::PublishedCopy { attempts: 3, .. }));
    assert!(store.get_by_id(1).await.unwrap().is_some());
}
