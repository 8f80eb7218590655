//! Script parity checks against a live Redis (`LECTERN_TEST_REDIS_URL`).

use std::sync::Arc;
use std::time::Duration;

use lectern::cache::{
    CacheConfig, CodeCache, CodeConfig, CodeLimitError, InteractiveCache, KeyTtl, KvCache,
    RedisCache, RedisOptions,
};
use lectern::domain::interactions::{CounterField, Interactive};

async fn connect() -> RedisCache {
    let url = std::env::var("LECTERN_TEST_REDIS_URL").expect("LECTERN_TEST_REDIS_URL must be set");
    RedisCache::connect(&RedisOptions {
        url,
        op_timeout: Duration::from_secs(1),
        connect_timeout: Duration::from_secs(2),
        retries: 1,
    })
    .await
    .expect("connect to redis")
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", rand::random::<u64>())
}

#[tokio::test]
#[ignore = "requires LECTERN_TEST_REDIS_URL"]
async fn values_expire_with_their_ttl() {
    let cache = connect().await;
    let key = unique("lectern-test:value");

    cache
        .set(&key, b"payload".to_vec(), Some(Duration::from_secs(30)))
        .await
        .expect("set");
    assert_eq!(cache.get(&key).await.expect("get"), Some(b"payload".to_vec()));
    assert!(matches!(
        cache.ttl(&key).await.expect("ttl"),
        KeyTtl::Expires(ttl) if ttl <= Duration::from_secs(30)
    ));

    cache.delete(&key).await.expect("delete");
    assert_eq!(cache.ttl(&key).await.expect("ttl"), KeyTtl::Missing);
}

#[tokio::test]
#[ignore = "requires LECTERN_TEST_REDIS_URL"]
async fn counters_only_bump_existing_hashes() {
    let kv: Arc<dyn KvCache> = Arc::new(connect().await);
    let counters = InteractiveCache::new(kv, CacheConfig::default());
    let biz = unique("lectern_test");

    assert!(
        !counters
            .incr_if_present(&biz, 1, CounterField::Read, 1)
            .await
            .expect("absent")
    );
    assert!(counters.get(&biz, 1).await.expect("get").is_none());

    counters
        .set(&Interactive::empty(&biz, 1))
        .await
        .expect("set");
    assert!(
        counters
            .incr_if_present(&biz, 1, CounterField::Read, 1)
            .await
            .expect("present")
    );
    let item = counters.get(&biz, 1).await.expect("get").expect("cached");
    assert_eq!(item.read_cnt, 1);
}

#[tokio::test]
#[ignore = "requires LECTERN_TEST_REDIS_URL"]
async fn code_scripts_enforce_cooldown_and_attempts() {
    let kv: Arc<dyn KvCache> = Arc::new(connect().await);
    let codes = CodeCache::new(kv, CodeConfig::default());
    let recipient = unique("recipient");

    codes.set("login", &recipient, "123456").await.expect("set");
    assert!(matches!(
        codes.set("login", &recipient, "654321").await,
        Err(CodeLimitError::SendTooFrequent)
    ));

    for _ in 0..3 {
        assert!(!codes.verify("login", &recipient, "000000").await.expect("verify"));
    }
    assert!(matches!(
        codes.verify("login", &recipient, "123456").await,
        Err(CodeLimitError::VerifyTooFrequent)
    ));
}
