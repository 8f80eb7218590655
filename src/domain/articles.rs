//! Article entities shared by the draft store, the published store and the caches.

use serde::{Deserialize, Serialize};

/// Number of characters kept when an article is projected into a listing.
pub const ABSTRACT_CHARS: usize = 128;

/// Lifecycle state of an article, persisted as a SMALLINT.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ArticleStatus {
    #[default]
    Unknown = 0,
    Draft = 1,
    Published = 2,
    Private = 3,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Unknown => "unknown",
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
            ArticleStatus::Private => "private",
        }
    }

    /// Whether a published copy in this state may be served to readers.
    pub fn is_public(self) -> bool {
        matches!(self, ArticleStatus::Published)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    /// Display name; empty until the public read path resolves it.
    #[serde(default)]
    pub name: String,
}

impl Author {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }
}

/// An article as seen by the engines.
///
/// `id == 0` means "not yet stored". `created_at`/`updated_at` are epoch
/// milliseconds assigned by the store; callers never set them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: Author,
    pub status: ArticleStatus,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Article {
    /// A not-yet-stored draft owned by `author_id`.
    pub fn draft(author_id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            content: content.into(),
            author: Author::new(author_id),
            status: ArticleStatus::Draft,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    /// Leading slice of the body used by listings.
    pub fn abstract_text(&self) -> String {
        match self.content.char_indices().nth(ABSTRACT_CHARS) {
            Some((cut, _)) => self.content[..cut].to_string(),
            None => self.content.clone(),
        }
    }
}

/// Limit/offset page over an author's drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorPage {
    pub limit: u32,
    pub offset: u32,
}

impl AuthorPage {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}
