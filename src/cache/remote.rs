//! Redis-backed [`KvCache`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, RedisResult, Script};
use tracing::{debug, info};

use super::backend::{KeyTtl, KvCache};
use super::error::CacheError;
use super::scripts::AtomicScript;

const TARGET: &str = "lectern::cache::remote";

/// Connection options for [`RedisCache::connect`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub url: String,
    /// Upper bound for every single command, script runs included.
    pub op_timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: usize,
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
    scripts: std::sync::Arc<DashMap<&'static str, Script>>,
}

impl RedisCache {
    pub async fn connect(options: &RedisOptions) -> Result<Self, CacheError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(options.retries)
            .set_connection_timeout(options.connect_timeout);

        let client = Client::open(options.url.as_str()).map_err(CacheError::backend)?;
        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(CacheError::backend)?;

        info!(
            target = TARGET,
            op_timeout_ms = options.op_timeout.as_millis() as u64,
            "Connected to redis"
        );

        Ok(Self {
            conn,
            op_timeout: options.op_timeout,
            scripts: Default::default(),
        })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::backend),
            Err(_) => Err(CacheError::Timeout { op }),
        }
    }

    fn script(&self, script: &AtomicScript) -> Script {
        self.scripts
            .entry(script.name)
            .or_insert_with(|| Script::new(script.source))
            .clone()
    }
}

fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        self.bounded("get", async move { conn.get::<_, Option<Vec<u8>>>(key).await })
            .await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded("set", async move {
            match ttl {
                Some(ttl) => {
                    conn.set_ex::<_, _, ()>(key, value, whole_seconds(ttl))
                        .await
                }
                None => conn.set::<_, _, ()>(key, value).await,
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded("delete", async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn run_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, CacheError> {
        let prepared = self.script(script);
        let mut invocation = prepared.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let reply: i64 = self
            .bounded("run_script", async move { invocation.invoke_async(&mut conn).await })
            .await?;
        debug!(target = TARGET, script = script.name, reply, "Script completed");
        Ok(reply)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let mut conn = self.conn.clone();
        self.bounded("hash_get_all", async move {
            conn.hgetall::<_, HashMap<String, String>>(key).await
        })
        .await
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded("hash_set", async move {
            conn.hset_multiple::<_, _, _, ()>(key, fields).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let secs = i64::try_from(whole_seconds(ttl)).unwrap_or(i64::MAX);
        self.bounded("expire", async move { conn.expire::<_, bool>(key, secs).await })
            .await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheError> {
        let mut conn = self.conn.clone();
        let raw: i64 = self
            .bounded("ttl", async move { conn.ttl::<_, i64>(key).await })
            .await?;
        Ok(match raw {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            secs => KeyTtl::Expires(Duration::from_secs(secs.max(0) as u64)),
        })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded("ping", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
