use async_trait::async_trait;

use crate::application::repos::{RepoError, UserDirectory};
use crate::domain::users::UserProfile;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    nickname: String,
}

#[async_trait]
impl UserDirectory for PostgresRepositories {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserProfile>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, nickname
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| UserProfile {
            id: row.id,
            nickname: row.nickname,
        }))
    }
}
