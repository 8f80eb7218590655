//! Assemble stores, cache backend and services from resolved settings.

use std::sync::Arc;

use tracing::info;

use crate::application::articles::{ArticleService, ArticleServiceConfig};
use crate::application::codes::{CodeService, TracingCodeSender};
use crate::application::interactions::InteractionService;
use crate::application::repos::{ArticleStore, InteractionStore, UserDirectory};
use crate::application::write_back::{WriteBack, WriteBackConfig};
use crate::cache::{
    ArticleCache, CacheConfig, CodeCache, CodeConfig, InteractiveCache, KvCache, MemoryCache,
    RedisCache, RedisOptions,
};
use crate::config::{Settings, StoreBackend};

use super::blobs::{BlobBackedStore, FsBlobStore};
use super::db::PostgresRepositories;
use super::error::InfraError;
use super::memory::MemoryRepositories;

const TARGET: &str = "lectern::infra::bootstrap";

/// The primary store selected by `store.backend`.
#[derive(Clone)]
pub enum PrimaryStore {
    Postgres(PostgresRepositories),
    Memory(Arc<MemoryRepositories>),
}

impl PrimaryStore {
    pub async fn health_check(&self) -> Result<(), InfraError> {
        match self {
            Self::Postgres(repos) => repos
                .health_check()
                .await
                .map_err(|err| InfraError::database(err.to_string())),
            Self::Memory(repos) => repos
                .health_check()
                .map_err(|err| InfraError::database(err.to_string())),
        }
    }

    fn stores(
        &self,
    ) -> (
        Arc<dyn ArticleStore>,
        Arc<dyn InteractionStore>,
        Arc<dyn UserDirectory>,
    ) {
        match self {
            Self::Postgres(repos) => {
                let repos = Arc::new(repos.clone());
                (repos.clone(), repos.clone(), repos)
            }
            Self::Memory(repos) => (repos.clone(), repos.clone(), repos.clone()),
        }
    }
}

/// Connected backends, before any service is built on top of them.
#[derive(Clone)]
pub struct Backends {
    pub store: PrimaryStore,
    pub cache: Arc<dyn KvCache>,
}

impl Backends {
    /// In-process store and cache; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            store: PrimaryStore::Memory(Arc::new(MemoryRepositories::new())),
            cache: Arc::new(MemoryCache::new()),
        }
    }

    pub async fn connect(settings: &Settings) -> Result<Self, InfraError> {
        let store = match settings.store.backend {
            StoreBackend::Memory => {
                info!(target = TARGET, "Using in-memory primary store");
                PrimaryStore::Memory(Arc::new(MemoryRepositories::new()))
            }
            StoreBackend::Postgres => {
                let url = settings.database.url.as_deref().ok_or_else(|| {
                    InfraError::configuration(
                        "database.url is required when store.backend is postgres",
                    )
                })?;
                let pool = PostgresRepositories::connect(
                    url,
                    settings.database.max_connections.get(),
                    settings.database.statement_timeout,
                )
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
                PrimaryStore::Postgres(PostgresRepositories::new(pool))
            }
        };

        let cache: Arc<dyn KvCache> = match settings.redis.url.as_ref() {
            Some(url) => {
                let options = RedisOptions {
                    url: url.clone(),
                    op_timeout: settings.redis.op_timeout,
                    connect_timeout: settings.redis.connect_timeout,
                    retries: settings.redis.retries,
                };
                let remote = RedisCache::connect(&options)
                    .await
                    .map_err(|err| InfraError::cache(err.to_string()))?;
                Arc::new(remote)
            }
            None => {
                info!(target = TARGET, "No redis.url configured; using in-process cache");
                Arc::new(MemoryCache::new())
            }
        };

        Ok(Self { store, cache })
    }

    pub async fn health_check(&self) -> Result<(), InfraError> {
        self.store.health_check().await?;
        self.cache
            .ping()
            .await
            .map_err(|err| InfraError::cache(err.to_string()))
    }
}

/// The three engines sharing one cache backend and one write-back pool.
#[derive(Clone)]
pub struct Services {
    pub articles: ArticleService,
    pub interactions: InteractionService,
    pub codes: CodeService,
}

impl Services {
    pub fn build(backends: &Backends, settings: &Settings) -> Result<Self, InfraError> {
        let (store, interaction_store, users) = backends.store.stores();

        let article_store: Arc<dyn ArticleStore> = match settings.store.blob_directory.as_ref() {
            Some(directory) => {
                let blobs = FsBlobStore::new(directory.clone())?;
                info!(
                    target = TARGET,
                    directory = %directory.display(),
                    "Mirroring published bodies to the blob store"
                );
                Arc::new(BlobBackedStore::new(store, Arc::new(blobs)))
            }
            None => store,
        };

        let cache_config = CacheConfig::from(&settings.cache);
        let write_back = WriteBack::new(WriteBackConfig::from(&settings.write_back));

        let articles = ArticleService::new(
            article_store,
            users,
            ArticleCache::new(backends.cache.clone(), cache_config.clone()),
            write_back.clone(),
            ArticleServiceConfig::from(&settings.store),
        );
        let interactions = InteractionService::new(
            interaction_store,
            InteractiveCache::new(backends.cache.clone(), cache_config),
            write_back,
        );
        let codes = CodeService::new(
            CodeCache::new(backends.cache.clone(), CodeConfig::from(&settings.codes)),
            Arc::new(TracingCodeSender),
        )
        .with_length(settings.codes.length);

        Ok(Self {
            articles,
            interactions,
            codes,
        })
    }
}
