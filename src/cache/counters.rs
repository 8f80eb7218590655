//! Counter cache: interaction aggregates kept as one hash per entity.
//!
//! Increments go through [`INCR_FIELD_IF_PRESENT`] so a cold entity stays
//! cold; only a full refill from the store creates the hash.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;

use crate::domain::interactions::{CounterField, Interactive};

use super::backend::KvCache;
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys;
use super::scripts::{INCR_APPLIED, INCR_FIELD_IF_PRESENT, INCR_KEY_ABSENT};

const METRIC_COUNTER_HIT: &str = "lectern_counter_cache_hit_total";
const METRIC_COUNTER_MISS: &str = "lectern_counter_cache_miss_total";

#[derive(Clone)]
pub struct InteractiveCache {
    kv: Arc<dyn KvCache>,
    config: CacheConfig,
}

impl InteractiveCache {
    pub fn new(kv: Arc<dyn KvCache>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    /// Add `delta` to one counter when the entity is already cached.
    ///
    /// Returns whether the hash existed.
    pub async fn incr_if_present(
        &self,
        biz: &str,
        biz_id: i64,
        field: CounterField,
        delta: i64,
    ) -> Result<bool, CacheError> {
        let key = keys::interactive(biz, biz_id);
        let reply = self
            .kv
            .run_script(
                &INCR_FIELD_IF_PRESENT,
                &[key],
                &[field.as_str().to_string(), delta.to_string()],
            )
            .await?;
        match reply {
            INCR_APPLIED => Ok(true),
            INCR_KEY_ABSENT => Ok(false),
            reply => Err(CacheError::UnexpectedReply {
                script: INCR_FIELD_IF_PRESENT.name,
                reply,
            }),
        }
    }

    pub async fn get(&self, biz: &str, biz_id: i64) -> Result<Option<Interactive>, CacheError> {
        let key = keys::interactive(biz, biz_id);
        let fields = self.kv.hash_get_all(&key).await?;
        if fields.is_empty() {
            counter!(METRIC_COUNTER_MISS).increment(1);
            return Ok(None);
        }
        counter!(METRIC_COUNTER_HIT).increment(1);

        let mut item = Interactive::empty(biz, biz_id);
        item.read_cnt = field_value(&key, &fields, CounterField::Read)?;
        item.like_cnt = field_value(&key, &fields, CounterField::Like)?;
        item.collect_cnt = field_value(&key, &fields, CounterField::Collect)?;
        Ok(Some(item))
    }

    /// Store the counters of `item` and start its TTL.
    pub async fn set(&self, item: &Interactive) -> Result<(), CacheError> {
        let key = keys::interactive_of(item);
        let fields: Vec<(String, String)> = CounterField::ALL
            .iter()
            .map(|field| (field.as_str().to_string(), counter_of(item, *field).to_string()))
            .collect();
        self.kv.hash_set(&key, &fields).await?;
        self.kv.expire(&key, self.config.interactive_ttl).await?;
        Ok(())
    }
}

fn counter_of(item: &Interactive, field: CounterField) -> i64 {
    match field {
        CounterField::Read => item.read_cnt,
        CounterField::Like => item.like_cnt,
        CounterField::Collect => item.collect_cnt,
    }
}

fn field_value(
    key: &str,
    fields: &HashMap<String, String>,
    field: CounterField,
) -> Result<i64, CacheError> {
    match fields.get(field.as_str()) {
        None => Ok(0),
        Some(raw) => raw.parse().map_err(|err| CacheError::Corrupt {
            key: key.to_string(),
            detail: format!("field `{}`: {err}", field.as_str()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::backend::KeyTtl;
    use crate::cache::memory::MemoryCache;

    fn cache() -> (Arc<MemoryCache>, InteractiveCache) {
        let kv = Arc::new(MemoryCache::new());
        let cache = InteractiveCache::new(kv.clone(), CacheConfig::default());
        (kv, cache)
    }

    #[tokio::test]
    async fn increments_skip_cold_entities() {
        let (kv, cache) = cache();
        let applied = cache
            .incr_if_present("article", 1, CounterField::Read, 1)
            .await
            .unwrap();
        assert!(!applied);
        assert!(cache.get("article", 1).await.unwrap().is_none());
        assert_eq!(
            kv.ttl(&keys::interactive("article", 1)).await.unwrap(),
            KeyTtl::Missing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_increment_hot_entity() {
        let (kv, cache) = cache();
        let mut item = Interactive::empty("article", 2);
        item.read_cnt = 10;
        item.like_cnt = 2;
        cache.set(&item).await.unwrap();

        assert!(
            cache
                .incr_if_present("article", 2, CounterField::Like, -1)
                .await
                .unwrap()
        );
        let cached = cache.get("article", 2).await.unwrap().unwrap();
        assert_eq!(cached.read_cnt, 10);
        assert_eq!(cached.like_cnt, 1);
        assert_eq!(cached.collect_cnt, 0);

        let ttl = kv.ttl(&keys::interactive("article", 2)).await.unwrap();
        assert_eq!(ttl, KeyTtl::Expires(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn corrupt_fields_are_reported() {
        let (kv, cache) = cache();
        kv.hash_set(
            &keys::interactive("article", 3),
            &[("read_cnt".to_string(), "many".to_string())],
        )
        .await
        .unwrap();
        assert!(matches!(
            cache.get("article", 3).await,
            Err(CacheError::Corrupt { .. })
        ));
    }
}
