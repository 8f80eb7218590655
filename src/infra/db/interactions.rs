use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::application::repos::{InteractionStore, NewCollectionItem, RepoError};
use crate::domain::interactions::{
    CollectionRecord, CounterField, Interactive, LikeRecord, LikeStatus,
};
use crate::util::clock::now_millis;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct InteractiveRow {
    biz: String,
    biz_id: i64,
    read_cnt: i64,
    like_cnt: i64,
    collect_cnt: i64,
    comment_cnt: i64,
    share_cnt: i64,
    ctime: i64,
    utime: i64,
}

impl From<InteractiveRow> for Interactive {
    fn from(row: InteractiveRow) -> Self {
        Self {
            biz: row.biz,
            biz_id: row.biz_id,
            read_cnt: row.read_cnt,
            like_cnt: row.like_cnt,
            collect_cnt: row.collect_cnt,
            comment_cnt: row.comment_cnt,
            share_cnt: row.share_cnt,
            liked: false,
            collected: false,
            created_at: row.ctime,
            updated_at: row.utime,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LikeRow {
    biz: String,
    biz_id: i64,
    uid: i64,
    status: LikeStatus,
    ctime: i64,
    utime: i64,
}

impl From<LikeRow> for LikeRecord {
    fn from(row: LikeRow) -> Self {
        Self {
            biz: row.biz,
            biz_id: row.biz_id,
            uid: row.uid,
            status: row.status,
            created_at: row.ctime,
            updated_at: row.utime,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    biz: String,
    biz_id: i64,
    uid: i64,
    cid: i64,
    ctime: i64,
    utime: i64,
}

impl From<CollectionRow> for CollectionRecord {
    fn from(row: CollectionRow) -> Self {
        Self {
            biz: row.biz,
            biz_id: row.biz_id,
            uid: row.uid,
            collection_id: row.cid,
            created_at: row.ctime,
            updated_at: row.utime,
        }
    }
}

/// Insert the aggregate with `field = 1`, or add one to it.
async fn bump_counter(
    tx: &mut Transaction<'_, Postgres>,
    biz: &str,
    biz_id: i64,
    field: CounterField,
    now: i64,
) -> Result<(), RepoError> {
    let column = field.as_str();
    let statement = format!(
        "INSERT INTO interactives (biz, biz_id, {column}, ctime, utime) \
         VALUES ($1, $2, 1, $3, $3) \
         ON CONFLICT (biz, biz_id) DO UPDATE \
         SET {column} = interactives.{column} + 1, utime = EXCLUDED.utime"
    );
    sqlx::query(&statement)
        .bind(biz)
        .bind(biz_id)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl InteractionStore for PostgresRepositories {
    async fn incr_read_cnt(&self, biz: &str, biz_id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        bump_counter(&mut tx, biz, biz_id, CounterField::Read, now_millis()).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn insert_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let changed: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO user_like_bizs (biz, biz_id, uid, status, ctime, utime)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (biz, biz_id, uid) DO UPDATE
            SET status = EXCLUDED.status, utime = EXCLUDED.utime
            WHERE user_like_bizs.status <> EXCLUDED.status
            RETURNING id
            "#,
        )
        .bind(biz)
        .bind(biz_id)
        .bind(uid)
        .bind(LikeStatus::Liked)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if changed.is_some() {
            bump_counter(&mut tx, biz, biz_id, CounterField::Like, now).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(changed.is_some())
    }

    async fn cancel_like(&self, biz: &str, biz_id: i64, uid: i64) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE user_like_bizs
            SET status = $1, utime = $2
            WHERE biz = $3 AND biz_id = $4 AND uid = $5 AND status = $6
            "#,
        )
        .bind(LikeStatus::Unliked)
        .bind(now)
        .bind(biz)
        .bind(biz_id)
        .bind(uid)
        .bind(LikeStatus::Liked)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let changed = result.rows_affected() > 0;
        if changed {
            sqlx::query(
                r#"
                UPDATE interactives
                SET like_cnt = GREATEST(like_cnt - 1, 0), utime = $1
                WHERE biz = $2 AND biz_id = $3
                "#,
            )
            .bind(now)
            .bind(biz)
            .bind(biz_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(changed)
    }

    async fn insert_collection(&self, item: &NewCollectionItem) -> Result<bool, RepoError> {
        let now = now_millis();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO user_collection_bizs (biz, biz_id, uid, cid, ctime, utime)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (biz, biz_id, uid, cid) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&item.biz)
        .bind(item.biz_id)
        .bind(item.uid)
        .bind(item.collection_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if inserted.is_some() {
            bump_counter(&mut tx, &item.biz, item.biz_id, CounterField::Collect, now).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(inserted.is_some())
    }

    async fn get_like(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<LikeRecord>, RepoError> {
        let row = sqlx::query_as::<_, LikeRow>(
            r#"
            SELECT biz, biz_id, uid, status, ctime, utime
            FROM user_like_bizs
            WHERE biz = $1 AND biz_id = $2 AND uid = $3
            "#,
        )
        .bind(biz)
        .bind(biz_id)
        .bind(uid)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(LikeRecord::from))
    }

    async fn get_collection(
        &self,
        biz: &str,
        biz_id: i64,
        uid: i64,
    ) -> Result<Option<CollectionRecord>, RepoError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT biz, biz_id, uid, cid, ctime, utime
            FROM user_collection_bizs
            WHERE biz = $1 AND biz_id = $2 AND uid = $3
            ORDER BY cid
            LIMIT 1
            "#,
        )
        .bind(biz)
        .bind(biz_id)
        .bind(uid)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CollectionRecord::from))
    }

    async fn get_interactive(
        &self,
        biz: &str,
        biz_id: i64,
    ) -> Result<Option<Interactive>, RepoError> {
        let row = sqlx::query_as::<_, InteractiveRow>(
            r#"
            SELECT biz, biz_id, read_cnt, like_cnt, collect_cnt, comment_cnt, share_cnt, ctime, utime
            FROM interactives
            WHERE biz = $1 AND biz_id = $2
            "#,
        )
        .bind(biz)
        .bind(biz_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Interactive::from))
    }
}
