use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use common::prelude::Scopes;

use crate::database::Database;

/// An issued API token. The bearer string itself is never stored.
///
/// Standalone tokens have `scopes` and no `service_account_id`; bound tokens
/// the other way round.
#[derive(Debug, Clone, FromRow)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    pub service_account_id: Option<String>,
    pub name: String,
    pub scopes: Option<Json<Scopes>>,
    pub token_hash: String,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Listing view of a token, safe to hand back to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTokenInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Scopes>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const COLUMNS: &str = "id, user_id, service_account_id, name, scopes, token_hash, expires_at, revoked_at, created_at";

impl ApiToken {
    pub async fn create_standalone(
        id: &str,
        user_id: &str,
        name: &str,
        scopes: &Scopes,
        token_hash: &str,
        expires_at: Option<OffsetDateTime>,
        db: &Database,
    ) -> Result<ApiToken, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(&format!(
            r#"
            INSERT INTO api_tokens (id, user_id, name, scopes, token_hash, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(Json(scopes))
        .bind(token_hash)
        .bind(expires_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&**db)
        .await
    }

    pub async fn create_bound(
        id: &str,
        user_id: &str,
        service_account_id: &str,
        name: &str,
        token_hash: &str,
        expires_at: Option<OffsetDateTime>,
        db: &Database,
    ) -> Result<ApiToken, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(&format!(
            r#"
            INSERT INTO api_tokens (id, user_id, service_account_id, name, token_hash, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(service_account_id)
        .bind(name)
        .bind(token_hash)
        .bind(expires_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&**db)
        .await
    }

    pub async fn get(id: &str, db: &Database) -> Result<Option<ApiToken>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(&format!("SELECT {COLUMNS} FROM api_tokens WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&**db)
            .await
    }

    pub async fn list_for_user(user_id: &str, db: &Database) -> Result<Vec<ApiToken>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {COLUMNS} FROM api_tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&**db)
        .await
    }

    /// Mark a live token revoked. Returns false when it doesn't exist, isn't
    /// owned by `user_id`, or was already revoked.
    pub async fn revoke(id: &str, user_id: &str, db: &Database) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE api_tokens
            SET revoked_at = ?1
            WHERE id = ?2 AND user_id = ?3 AND revoked_at IS NULL
            "#,
        )
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(user_id)
        .execute(&**db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.map_or(true, |exp| exp > now)
    }

    pub fn scopes(&self) -> Option<&Scopes> {
        self.scopes.as_ref().map(|json| &json.0)
    }

    pub fn info(&self) -> ApiTokenInfo {
        ApiTokenInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            service_account_id: self.service_account_id.clone(),
            scopes: self.scopes().cloned(),
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        }
    }
}
