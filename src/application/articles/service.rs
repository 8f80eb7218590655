use std::sync::Arc;

use crate::application::repos::{ArticleStore, UserDirectory};
use crate::application::write_back::WriteBack;
use crate::cache::ArticleCache;

use super::types::ArticleServiceConfig;

/// Publish-sync engine plus the read-through paths of the content cache.
#[derive(Clone)]
pub struct ArticleService {
    pub(crate) store: Arc<dyn ArticleStore>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) cache: ArticleCache,
    pub(crate) write_back: WriteBack,
    pub(crate) config: ArticleServiceConfig,
}

impl ArticleService {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        users: Arc<dyn UserDirectory>,
        cache: ArticleCache,
        write_back: WriteBack,
        config: ArticleServiceConfig,
    ) -> Self {
        Self {
            store,
            users,
            cache,
            write_back,
            config,
        }
    }

    pub fn write_back(&self) -> &WriteBack {
        &self.write_back
    }
}
