//! Engagement aggregates and per-user interaction records.

use serde::{Deserialize, Serialize};

/// Counters for one `(biz, biz_id)` pair, optionally personalised for a viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactive {
    pub biz: String,
    pub biz_id: i64,
    pub read_cnt: i64,
    pub like_cnt: i64,
    pub collect_cnt: i64,
    pub comment_cnt: i64,
    pub share_cnt: i64,
    /// Whether the viewer liked the entity; never cached.
    pub liked: bool,
    /// Whether the viewer collected the entity; never cached.
    pub collected: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Interactive {
    pub fn empty(biz: &str, biz_id: i64) -> Self {
        Self {
            biz: biz.to_string(),
            biz_id,
            ..Self::default()
        }
    }
}

/// Soft like toggle, persisted as a SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum LikeStatus {
    Unliked = 0,
    Liked = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeRecord {
    pub biz: String,
    pub biz_id: i64,
    pub uid: i64,
    pub status: LikeStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One entity collected into one folder; the same entity may sit in several folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub biz: String,
    pub biz_id: i64,
    pub uid: i64,
    pub collection_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Counter fields mirrored into the counter cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Read,
    Like,
    Collect,
}

impl CounterField {
    pub const ALL: [CounterField; 3] = [CounterField::Read, CounterField::Like, CounterField::Collect];

    pub fn as_str(self) -> &'static str {
        match self {
            CounterField::Read => "read_cnt",
            CounterField::Like => "like_cnt",
            CounterField::Collect => "collect_cnt",
        }
    }
}
