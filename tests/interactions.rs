mod support;

use std::sync::Arc;

use lectern::application::repos::{InteractionStore, NewCollectionItem};
use lectern::cache::{CacheConfig, InteractiveCache};

use support::Harness;

const BIZ: &str = "article";

#[tokio::test]
async fn likes_are_idempotent_per_user() {
    let harness = Harness::new();
    let interactions = &harness.services.interactions;

    interactions.like(BIZ, 1, 10).await.expect("like");
    interactions.like(BIZ, 1, 10).await.expect("like again");
    interactions.like(BIZ, 1, 11).await.expect("second user");

    let view = interactions.get(BIZ, 1, 10).await.expect("get");
    assert_eq!(view.like_cnt, 2);
    assert!(view.liked);
    harness.settle().await;

    interactions.cancel_like(BIZ, 1, 10).await.expect("cancel");
    interactions.cancel_like(BIZ, 1, 10).await.expect("cancel again");
    harness.settle().await;

    let view = interactions.get(BIZ, 1, 10).await.expect("get");
    assert_eq!(view.like_cnt, 1);
    assert!(!view.liked);

    let other = interactions.get(BIZ, 1, 11).await.expect("get");
    assert!(other.liked);
}

#[tokio::test]
async fn collections_count_once_per_folder() {
    let harness = Harness::new();
    let interactions = &harness.services.interactions;
    let item = |collection_id| NewCollectionItem {
        biz: BIZ.to_string(),
        biz_id: 2,
        uid: 10,
        collection_id,
    };

    interactions.collect(item(1)).await.expect("collect");
    interactions.collect(item(1)).await.expect("collect again");
    interactions.collect(item(2)).await.expect("other folder");

    let view = interactions.get(BIZ, 2, 10).await.expect("get");
    assert_eq!(view.collect_cnt, 2);
    assert!(view.collected);
    assert!(!view.liked);

    let stranger = interactions.get(BIZ, 2, 99).await.expect("get");
    assert!(!stranger.collected);
}

#[tokio::test]
async fn unknown_entities_read_as_zero() {
    let harness = Harness::new();
    let view = harness
        .services
        .interactions
        .get(BIZ, 404, 1)
        .await
        .expect("get");
    assert_eq!(view.read_cnt, 0);
    assert_eq!(view.like_cnt, 0);
    assert_eq!(view.biz, BIZ);
    assert_eq!(view.biz_id, 404);
}

#[tokio::test]
async fn invalid_biz_is_rejected() {
    let harness = Harness::new();
    assert!(harness.services.interactions.incr_read("", 1).await.is_err());
    assert!(harness.services.interactions.like("a:b", 1, 1).await.is_err());
}

async fn concurrent_reads(n: i64) {
    let harness = Harness::new();
    let interactions = harness.services.interactions.clone();

    // Warm the aggregate so the cache is bumped alongside the store.
    interactions.get(BIZ, 7, 0).await.expect("warm");
    harness.settle().await;

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let interactions = interactions.clone();
            tokio::spawn(async move { interactions.incr_read(BIZ, 7).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("incr_read");
    }

    let stored = harness
        .store()
        .get_interactive(BIZ, 7)
        .await
        .expect("store read")
        .expect("aggregate exists");
    assert_eq!(stored.read_cnt, n);

    let cache = InteractiveCache::new(Arc::clone(&harness.backends.cache), CacheConfig::default());
    let cached = cache.get(BIZ, 7).await.expect("cache read").expect("cached");
    assert_eq!(cached.read_cnt, n);

    assert_eq!(
        interactions.get(BIZ, 7, 0).await.expect("get").read_cnt,
        n
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_read_increments_are_not_lost() {
    for n in [1, 10, 100] {
        concurrent_reads(n).await;
    }
}
