//! Interaction engine: durable counter writes, conditional cache increments
//! and personalised aggregate reads.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::application::repos::{InteractionStore, NewCollectionItem, RepoError};
use crate::application::write_back::WriteBack;
use crate::cache::InteractiveCache;
use crate::domain::error::{DomainError, ensure_biz};
use crate::domain::interactions::{CounterField, Interactive, LikeStatus};

const TARGET: &str = "lectern::application::interactions";

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct InteractionService {
    store: Arc<dyn InteractionStore>,
    cache: InteractiveCache,
    write_back: WriteBack,
}

impl InteractionService {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        cache: InteractiveCache,
        write_back: WriteBack,
    ) -> Self {
        Self {
            store,
            cache,
            write_back,
        }
    }

    pub fn write_back(&self) -> &WriteBack {
        &self.write_back
    }

    pub async fn incr_read(&self, biz: &str, biz_id: i64) -> Result<(), InteractionError> {
        ensure_biz(biz)?;
        self.store.incr_read_cnt(biz, biz_id).await?;
        self.bump_cached(biz, biz_id, CounterField::Read, 1).await;
        Ok(())
    }

    /// Like `(biz, biz_id)` as `uid`. Repeating a like changes nothing.
    pub async fn like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<(), InteractionError> {
        ensure_biz(biz)?;
        if self.store.insert_like(biz, biz_id, uid).await? {
            self.bump_cached(biz, biz_id, CounterField::Like, 1).await;
        }
        Ok(())
    }

    pub async fn cancel_like(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<(), InteractionError> {
        ensure_biz(biz)?;
        if self.store.cancel_like(biz, biz_id, uid).await? {
            self.bump_cached(biz, biz_id, CounterField::Like, -1).await;
        }
        Ok(())
    }

    /// File the entity into one of the user's collections.
    pub async fn collect(&self, item: NewCollectionItem) -> Result<(), InteractionError> {
        ensure_biz(&item.biz)?;
        if self.store.insert_collection(&item).await? {
            self.bump_cached(&item.biz, item.biz_id, CounterField::Collect, 1)
                .await;
        }
        Ok(())
    }

    /// Aggregate counters plus whether `viewer_id` liked and collected the entity.
    pub async fn get(
        &self,
        biz: &str,
        biz_id: i64,
        viewer_id: i64,
    ) -> Result<Interactive, InteractionError> {
        ensure_biz(biz)?;
        let (counters, liked, collected) = tokio::join!(
            self.counters(biz, biz_id),
            self.liked(biz, biz_id, viewer_id),
            self.collected(biz, biz_id, viewer_id),
        );
        let mut item = counters?;
        item.liked = liked;
        item.collected = collected;
        Ok(item)
    }

    async fn counters(&self, biz: &str, biz_id: i64) -> Result<Interactive, InteractionError> {
        match self.cache.get(biz, biz_id).await {
            Ok(Some(item)) => return Ok(item),
            Ok(None) => {}
            Err(err) => {
                warn!(target = TARGET, biz, biz_id, error = %err, "Counter cache read failed");
            }
        }

        let item = self
            .store
            .get_interactive(biz, biz_id)
            .await?
            .unwrap_or_else(|| Interactive::empty(biz, biz_id));

        let cache = self.cache.clone();
        let cached = item.clone();
        self.write_back.spawn("interactive_fill", async move {
            cache.set(&cached).await
        });
        Ok(item)
    }

    async fn liked(&self, biz: &str, biz_id: i64, uid: i64) -> bool {
        match self.store.get_like(biz, biz_id, uid).await {
            Ok(record) => record.is_some_and(|record| record.status == LikeStatus::Liked),
            Err(err) => {
                warn!(target = TARGET, biz, biz_id, uid, error = %err, "Like lookup failed");
                false
            }
        }
    }

    async fn collected(&self, biz: &str, biz_id: i64, uid: i64) -> bool {
        match self.store.get_collection(biz, biz_id, uid).await {
            Ok(record) => record.is_some(),
            Err(err) => {
                warn!(target = TARGET, biz, biz_id, uid, error = %err, "Collection lookup failed");
                false
            }
        }
    }

    /// The durable write already happened; a failed cache update only leaves the entry stale.
    async fn bump_cached(&self, biz: &str, biz_id: i64, field: CounterField, delta: i64) {
        if let Err(err) = self.cache.incr_if_present(biz, biz_id, field, delta).await {
            warn!(
                target = TARGET,
                biz,
                biz_id,
                field = field.as_str(),
                delta,
                error = %err,
                "Counter cache increment failed"
            );
        }
    }
}
