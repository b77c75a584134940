use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use super::new_id;
use crate::database::Database;

/// Audit record of an issued session token.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub client_ip: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Session {
    pub async fn create(
        user_id: &str,
        client_ip: Option<&str>,
        expires_at: OffsetDateTime,
        db: &Database,
    ) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, client_ip, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, user_id, client_ip, expires_at, created_at
            "#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(client_ip)
        .bind(expires_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&**db)
        .await
    }

    pub async fn get(id: &str, db: &Database) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, client_ip, expires_at, created_at
            FROM sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&**db)
        .await
    }

    pub async fn list_for_user(user_id: &str, db: &Database) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, client_ip, expires_at, created_at
            FROM sessions
            WHERE user_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&**db)
        .await
    }

    pub async fn delete(id: &str, user_id: &str, db: &Database) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&**db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}
