use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::application::repos::{ArticleStore, RepoError};
use crate::domain::articles::{Article, ArticleStatus, Author, AuthorPage};
use crate::util::clock::now_millis;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, require_affected};

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    content: String,
    author_id: i64,
    status: ArticleStatus,
    ctime: i64,
    utime: i64,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author: Author::new(row.author_id),
            status: row.status,
            created_at: row.ctime,
            updated_at: row.utime,
        }
    }
}

async fn insert_draft(
    tx: &mut Transaction<'_, Postgres>,
    article: &Article,
    now: i64,
) -> Result<i64, RepoError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO articles (title, content, author_id, status, ctime, utime)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.author.id)
    .bind(article.status)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)
}

async fn update_owned_draft(
    tx: &mut Transaction<'_, Postgres>,
    article: &Article,
    now: i64,
) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"
        UPDATE articles
        SET title = $1, content = $2, status = $3, utime = $4
        WHERE id = $5 AND author_id = $6
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.status)
    .bind(now)
    .bind(article.id)
    .bind(article.author.id)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    require_affected(result.rows_affected())
}

async fn upsert_published_copy(
    tx: &mut Transaction<'_, Postgres>,
    article: &Article,
    now: i64,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO published_articles (id, title, content, author_id, status, ctime, utime)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title,
            content = EXCLUDED.content,
            status = EXCLUDED.status,
            utime = EXCLUDED.utime
        "#,
    )
    .bind(article.id)
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.author.id)
    .bind(article.status)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl ArticleStore for PostgresRepositories {
    async fn insert(&self, article: &Article) -> Result<i64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let id = insert_draft(&mut tx, article, now_millis()).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(id)
    }

    async fn update_by_id(&self, article: &Article) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        update_owned_draft(&mut tx, article, now_millis()).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn sync(&self, article: &Article) -> Result<i64, RepoError> {
        let now = now_millis();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let id = if article.is_new() {
            insert_draft(&mut tx, article, now).await?
        } else {
            update_owned_draft(&mut tx, article, now).await?;
            article.id
        };

        let published = Article {
            id,
            ..article.clone()
        };
        upsert_published_copy(&mut tx, &published, now).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(id)
    }

    async fn sync_status(
        &self,
        id: i64,
        author_id: i64,
        status: ArticleStatus,
    ) -> Result<(), RepoError> {
        let now = now_millis();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE articles
            SET status = $1, utime = $2
            WHERE id = $3 AND author_id = $4
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .bind(author_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        require_affected(result.rows_affected())?;

        sqlx::query(
            r#"
            UPDATE published_articles
            SET status = $1, utime = $2
            WHERE id = $3
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn upsert_published(&self, article: &Article) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        upsert_published_copy(&mut tx, article, now_millis()).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn get_by_author(
        &self,
        author_id: i64,
        page: AuthorPage,
    ) -> Result<Vec<Article>, RepoError> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, content, author_id, status, ctime, utime
            FROM articles
            WHERE author_id = $1
            ORDER BY utime DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(author_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, content, author_id, status, ctime, utime
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Article::from))
    }

    async fn get_published_by_id(&self, id: i64) -> Result<Option<Article>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, content, author_id, status, ctime, utime
            FROM published_articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Article::from))
    }
}
