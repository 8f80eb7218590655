//! In-process repositories.
//!
//! Document-style storage behind one mutex: every trait call takes the lock
//! once, so each call (including `sync`) is all-or-nothing. Ids start at 1.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::repos::{
    ArticleStore, InteractionStore, NewCollectionItem, RepoError, UserDirectory,
};
use crate::cache::mutex_lock;
use crate::domain::articles::{Article, ArticleStatus, Author, AuthorPage};
use crate::domain::interactions::{CollectionRecord, Interactive, LikeRecord, LikeStatus};
use crate::domain::users::UserProfile;
use crate::util::clock::now_millis;

const TARGET: &str = "lectern::infra::memory";

type LikeKey = (String, i64, i64);
type CollectionKey = (String, i64, i64, i64);

#[derive(Debug)]
struct State {
    next_article_id: i64,
    drafts: BTreeMap<i64, Article>,
    published: BTreeMap<i64, Article>,
    interactives: HashMap<(String, i64), Interactive>,
    likes: HashMap<LikeKey, LikeRecord>,
    collections: BTreeMap<CollectionKey, CollectionRecord>,
    users: HashMap<i64, UserProfile>,
    failing_published_writes: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_article_id: 1,
            drafts: BTreeMap::new(),
            published: BTreeMap::new(),
            interactives: HashMap::new(),
            likes: HashMap::new(),
            collections: BTreeMap::new(),
            users: HashMap::new(),
            failing_published_writes: 0,
        }
    }
}

impl State {
    fn owned_draft(&mut self, id: i64, author_id: i64) -> Result<&mut Article, RepoError> {
        self.drafts
            .get_mut(&id)
            .filter(|draft| draft.author.id == author_id)
            .ok_or(RepoError::Unaffected)
    }

    fn take_published_fault(&mut self) -> Result<(), RepoError> {
        if self.failing_published_writes > 0 {
            self.failing_published_writes -= 1;
            return Err(RepoError::from_persistence(
                "published store rejected the write",
            ));
        }
        Ok(())
    }

    fn write_published(&mut self, article: &Article, now: i64) {
        self.published
            .entry(article.id)
            .and_modify(|copy| {
                copy.title = article.title.clone();
                copy.content = article.content.clone();
                copy.status = article.status;
                copy.updated_at = now;
            })
            .or_insert_with(|| Article {
                created_at: now,
                updated_at: now,
                author: Author::new(article.author.id),
                ..article.clone()
            });
    }

    fn aggregate(&mut self, biz: &str, biz_id: i64, now: i64) -> &mut Interactive {
        let item = self
            .interactives
            .entry((biz.to_string(), biz_id))
            .or_insert_with(|| Interactive {
                created_at: now,
                ..Interactive::empty(biz, biz_id)
            });
        item.updated_at = now;
        item
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    state: Mutex<State>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user for author-name lookups.
    pub fn insert_user(&self, profile: UserProfile) {
        mutex_lock(&self.state, TARGET, "insert_user")
            .users
            .insert(profile.id, profile);
    }

    /// Make the next `count` published-copy writes fail with a persistence error.
    ///
    /// A failing `sync` leaves both the draft and the published copy untouched.
    pub fn fail_published_writes(&self, count: u32) {
        mutex_lock(&self.state, TARGET, "fail_published_writes").failing_published_writes = count;
    }

    pub fn health_check(&self) -> Result<(), RepoError> {
        let _state = mutex_lock(&self.state, TARGET, "health_check");
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for MemoryRepositories {
    async fn insert(&self, article: &Article) -> Result<i64, RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "insert");
        let id = state.next_article_id;
        state.next_article_id += 1;
        state.drafts.insert(
            id,
            Article {
                id,
                created_at: now,
                updated_at: now,
                author: Author::new(article.author.id),
                ..article.clone()
            },
        );
        Ok(id)
    }

    async fn update_by_id(&self, article: &Article) -> Result<(), RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "update_by_id");
        let draft = state.owned_draft(article.id, article.author.id)?;
        draft.title = article.title.clone();
        draft.content = article.content.clone();
        draft.status = article.status;
        draft.updated_at = now;
        Ok(())
    }

    async fn sync(&self, article: &Article) -> Result<i64, RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "sync");

        let id = if article.is_new() {
            state.next_article_id
        } else {
            state.owned_draft(article.id, article.author.id)?;
            article.id
        };
        state.take_published_fault()?;

        let draft = Article {
            id,
            ..article.clone()
        };
        if article.is_new() {
            state.next_article_id += 1;
            state.drafts.insert(
                id,
                Article {
                    created_at: now,
                    updated_at: now,
                    author: Author::new(article.author.id),
                    ..draft.clone()
                },
            );
        } else {
            let stored = state.owned_draft(id, article.author.id)?;
            stored.title = draft.title.clone();
            stored.content = draft.content.clone();
            stored.status = draft.status;
            stored.updated_at = now;
        }
        state.write_published(&draft, now);
        Ok(id)
    }

    async fn sync_status(
        &self,
        id: i64,
        author_id: i64,
        status: ArticleStatus,
    ) -> Result<(), RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "sync_status");
        let draft = state.owned_draft(id, author_id)?;
        draft.status = status;
        draft.updated_at = now;
        if let Some(copy) = state.published.get_mut(&id) {
            copy.status = status;
            copy.updated_at = now;
        }
        Ok(())
    }

    async fn upsert_published(&self, article: &Article) -> Result<(), RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "upsert_published");
        state.take_published_fault()?;
        state.write_published(article, now);
        Ok(())
    }

    async fn get_by_author(
        &self,
        author_id: i64,
        page: AuthorPage,
    ) -> Result<Vec<Article>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_by_author");
        let mut articles: Vec<Article> = state
            .drafts
            .values()
            .filter(|article| article.author.id == author_id)
            .cloned()
            .collect();
        articles.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(articles
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_by_id");
        Ok(state.drafts.get(&id).cloned())
    }

    async fn get_published_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_published_by_id");
        Ok(state.published.get(&id).cloned())
    }
}

#[async_trait]
impl InteractionStore for MemoryRepositories {
    async fn incr_read_cnt(&self, biz: &str, biz_id: i64) -> Result<(), RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "incr_read_cnt");
        state.aggregate(biz, biz_id, now).read_cnt += 1;
        Ok(())
    }

    async fn insert_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "insert_like");
        let key = (biz.to_string(), biz_id, uid);
        match state.likes.get_mut(&key) {
            Some(record) if record.status == LikeStatus::Liked => return Ok(false),
            Some(record) => {
                record.status = LikeStatus::Liked;
                record.updated_at = now;
            }
            None => {
                state.likes.insert(
                    key,
                    LikeRecord {
                        biz: biz.to_string(),
                        biz_id,
                        uid,
                        status: LikeStatus::Liked,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        state.aggregate(biz, biz_id, now).like_cnt += 1;
        Ok(true)
    }

    async fn cancel_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "cancel_like");
        let key = (biz.to_string(), biz_id, uid);
        match state.likes.get_mut(&key) {
            Some(record) if record.status == LikeStatus::Liked => {
                record.status = LikeStatus::Unliked;
                record.updated_at = now;
            }
            _ => return Ok(false),
        }
        let item = state.aggregate(biz, biz_id, now);
        item.like_cnt = (item.like_cnt - 1).max(0);
        Ok(true)
    }

    async fn insert_collection(&self, item: &NewCollectionItem) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut state = mutex_lock(&self.state, TARGET, "insert_collection");
        let key = (
            item.biz.clone(),
            item.biz_id,
            item.uid,
            item.collection_id,
        );
        if state.collections.contains_key(&key) {
            return Ok(false);
        }
        state.collections.insert(
            key,
            CollectionRecord {
                biz: item.biz.clone(),
                biz_id: item.biz_id,
                uid: item.uid,
                collection_id: item.collection_id,
                created_at: now,
                updated_at: now,
            },
        );
        state.aggregate(&item.biz, item.biz_id, now).collect_cnt += 1;
        Ok(true)
    }

    async fn get_like(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<LikeRecord>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_like");
        Ok(state.likes.get(&(biz.to_string(), biz_id, uid)).cloned())
    }

    async fn get_collection(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<CollectionRecord>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_collection");
        Ok(state
            .collections
            .values()
            .find(|record| record.biz == biz && record.biz_id == biz_id && record.uid == uid)
            .cloned())
    }

    async fn get_interactive(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<Interactive>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "get_interactive");
        Ok(state.interactives.get(&(biz.to_string(), biz_id)).cloned())
    }
}

#[async_trait]
impl UserDirectory for MemoryRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, RepoError> {
        let state = mutex_lock(&self.state, TARGET, "find_by_id");
        Ok(state.users.get(&id).cloned())
    }
}
