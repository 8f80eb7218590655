mod support;

use std::collections::HashSet;

use lectern::application::articles::ArticleError;
use lectern::cache::{KvCache, keys};
use lectern::domain::articles::{Article, ArticleStatus, AuthorPage};
use lectern::domain::users::UserProfile;

use support::Harness;

#[tokio::test]
async fn draft_then_publish_then_public_reads() {
    let harness = Harness::new();
    harness.store().insert_user(UserProfile {
        id: 123,
        nickname: "author-123".to_string(),
    });
    let articles = &harness.services.articles;

    let id = articles
        .save_draft(Article::draft(123, "A", "B"))
        .await
        .expect("save draft");
    assert_eq!(id, 1);

    let published = Article {
        id,
        ..Article::draft(123, "A", "B")
    };
    assert_eq!(articles.publish(published).await.expect("publish"), 1);
    harness.settle().await;
    harness
        .backends
        .cache
        .delete(&keys::article_public_detail(id))
        .await
        .expect("drop pre-warmed entry");

    let cold = articles.get_published_by_id(id).await.expect("cold read");
    assert_eq!(cold.id, 1);
    assert_eq!(cold.title, "A");
    assert_eq!(cold.content, "B");
    assert_eq!(cold.author.name, "author-123");
    assert_eq!(cold.status, ArticleStatus::Published);

    harness.settle().await;
    let warm = articles.get_published_by_id(id).await.expect("warm read");
    assert_eq!(warm, cold);

    let detail_cold = articles.get_by_id(id).await.expect("detail cold");
    harness.settle().await;
    let detail_warm = articles.get_by_id(id).await.expect("detail warm");
    assert_eq!(detail_cold, detail_warm);
}

#[tokio::test]
async fn publish_read_list_and_withdraw() {
    let harness = Harness::new();
    harness.store().insert_user(UserProfile {
        id: 1,
        nickname: "ada".to_string(),
    });
    let articles = &harness.services.articles;

    let id = articles
        .publish(Article::draft(1, "Hello", "first post"))
        .await
        .expect("publish");
    assert_eq!(id, 1);

    let cold = articles.get_published_by_id(id).await.expect("cold read");
    harness.settle().await;
    let warm = articles.get_published_by_id(id).await.expect("warm read");
    assert_eq!(cold, warm);
    assert_eq!(warm.author.name, "ada");
    assert_eq!(warm.status, ArticleStatus::Published);

    let page = AuthorPage::new(harness.settings.cache.first_page_size.get(), 0);
    let listed = articles.list_by_author(1, page).await.expect("listing");
    assert_eq!(listed.len(), 1);
    harness.settle().await;
    assert_eq!(articles.first_page(1).await.expect("cached page").len(), 1);

    articles.withdraw(id, 1).await.expect("withdraw");
    assert!(matches!(
        articles.get_published_by_id(id).await,
        Err(ArticleError::NotFound)
    ));
    assert!(matches!(
        articles.first_page(1).await,
        Err(ArticleError::NotFound)
    ));
    assert_eq!(
        articles.get_by_id(id).await.expect("draft").status,
        ArticleStatus::Private
    );
}

#[tokio::test]
async fn republishing_updates_the_reader_copy() {
    let harness = Harness::new();
    harness.store().insert_user(UserProfile {
        id: 3,
        nickname: "grace".to_string(),
    });
    let articles = &harness.services.articles;

    let id = articles
        .publish(Article::draft(3, "v1", "one"))
        .await
        .expect("first publish");
    harness.settle().await;
    assert_eq!(
        articles.get_published_by_id(id).await.expect("v1").title,
        "v1"
    );

    let edited = Article {
        id,
        ..Article::draft(3, "v2", "two")
    };
    articles.publish(edited).await.expect("second publish");
    harness.settle().await;

    let current = articles.get_published_by_id(id).await.expect("v2");
    assert_eq!(current.title, "v2");
    assert_eq!(current.content, "two");
}

#[tokio::test]
async fn listing_pages_follow_recency() {
    let harness = Harness::new();
    let articles = &harness.services.articles;

    let mut ids = Vec::new();
    for n in 0..5 {
        let id = articles
            .save_draft(Article::draft(9, format!("draft {n}"), "body"))
            .await
            .expect("save");
        ids.push(id);
    }

    let first = articles
        .list_by_author(9, AuthorPage::new(2, 0))
        .await
        .expect("first page");
    let second = articles
        .list_by_author(9, AuthorPage::new(2, 2))
        .await
        .expect("second page");

    let seen: Vec<i64> = first.iter().chain(second.iter()).map(|a| a.id).collect();
    assert_eq!(seen.len(), 4);
    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len());
    assert!(seen.iter().all(|id| ids.contains(id)));
}

#[tokio::test]
async fn blob_directory_mirrors_published_bodies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut settings = support::memory_settings();
    settings.store.blob_directory = Some(dir.path().to_path_buf());

    let backends = lectern::infra::bootstrap::Backends::in_memory();
    let services =
        lectern::infra::bootstrap::Services::build(&backends, &settings).expect("services");

    let id = services
        .articles
        .publish(Article::draft(4, "mirrored", "body on disk"))
        .await
        .expect("publish");

    let path = dir.path().join(lectern::infra::blobs::article_blob_key(id));
    let stored = tokio::fs::read_to_string(&path).await.expect("blob written");
    assert_eq!(stored, "body on disk");

    services.articles.withdraw(id, 4).await.expect("withdraw");
    assert!(!path.exists());
}
