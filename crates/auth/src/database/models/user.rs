use sqlx::FromRow;
use time::OffsetDateTime;

use super::{new_id, ServiceAccount};
use crate::database::Database;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub async fn create(
        username: &str,
        display_name: Option<&str>,
        password_hash: &str,
        db: &Database,
    ) -> Result<User, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, display_name, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING id, username, display_name, password_hash, created_at, updated_at
            "#,
        )
        .bind(new_id())
        .bind(username)
        .bind(display_name)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&**db)
        .await
    }

    pub async fn get(id: &str, db: &Database) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, password_hash, created_at, updated_at
            FROM users
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&**db)
        .await
    }

    pub async fn get_by_username(
        username: &str,
        db: &Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, password_hash, created_at, updated_at
            FROM users
            WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(&**db)
        .await
    }

    pub async fn update_display_name(
        id: &str,
        display_name: Option<&str>,
        db: &Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET display_name = ?1, updated_at = ?2
            WHERE id = ?3
            RETURNING id, username, display_name, password_hash, created_at, updated_at
            "#,
        )
        .bind(display_name)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .fetch_optional(&**db)
        .await
    }

    /// Remove the user together with their service accounts, in one
    /// transaction. Sessions and tokens follow through the cascade.
    ///
    /// Returns the removed accounts, or `None` (and changes nothing) when the
    /// user doesn't exist.
    pub async fn delete(
        id: &str,
        db: &Database,
    ) -> Result<Option<Vec<ServiceAccount>>, sqlx::Error> {
        let mut tx = db.begin().await?;

        let accounts = ServiceAccount::delete_for_user(id, &mut tx).await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(accounts))
    }
}
