use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, Sqlite, Transaction};
use time::OffsetDateTime;

use common::prelude::{IdentityPermission, Scopes};

use super::new_id;
use crate::database::Database;

/// A named identity owned by a user. Bound tokens take their authority from
/// its scopes at request time. `version` goes up by one on every scope change.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceAccount {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub scopes: Json<Scopes>,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceAccountInfo {
    pub id: String,
    pub name: String,
    pub scopes: Scopes,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const COLUMNS: &str = "id, user_id, name, scopes, version, created_at, updated_at";

impl ServiceAccount {
    pub async fn create(
        user_id: &str,
        name: &str,
        scopes: &Scopes,
        db: &Database,
    ) -> Result<ServiceAccount, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, ServiceAccount>(&format!(
            r#"
            INSERT INTO service_accounts (id, user_id, name, scopes, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new_id())
        .bind(user_id)
        .bind(name)
        .bind(Json(scopes))
        .bind(now)
        .fetch_one(&**db)
        .await
    }

    pub async fn get(id: &str, db: &Database) -> Result<Option<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {COLUMNS} FROM service_accounts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&**db)
        .await
    }

    /// Like [`ServiceAccount::get`], but only if owned by `user_id`.
    pub async fn get_owned(
        id: &str,
        user_id: &str,
        db: &Database,
    ) -> Result<Option<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {COLUMNS} FROM service_accounts WHERE id = ?1 AND user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&**db)
        .await
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &Database,
    ) -> Result<Vec<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {COLUMNS} FROM service_accounts WHERE user_id = ?1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&**db)
        .await
    }

    pub async fn list_all(db: &Database) -> Result<Vec<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {COLUMNS} FROM service_accounts ORDER BY id"
        ))
        .fetch_all(&**db)
        .await
    }

    /// Replace the scopes and bump the version in one statement.
    pub async fn update_scopes(
        id: &str,
        user_id: &str,
        scopes: &Scopes,
        db: &Database,
    ) -> Result<Option<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            r#"
            UPDATE service_accounts
            SET scopes = ?1, version = version + 1, updated_at = ?2
            WHERE id = ?3 AND user_id = ?4
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Json(scopes))
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&**db)
        .await
    }

    /// Remove the account and its bound tokens, returning the removed row.
    pub async fn delete(
        id: &str,
        user_id: &str,
        db: &Database,
    ) -> Result<Option<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            r#"
            DELETE FROM service_accounts
            WHERE id = ?1 AND user_id = ?2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&**db)
        .await
    }

    /// Remove every account of `user_id` inside `tx`, returning the rows.
    pub async fn delete_for_user(
        user_id: &str,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<Vec<ServiceAccount>, sqlx::Error> {
        sqlx::query_as::<_, ServiceAccount>(&format!(
            "DELETE FROM service_accounts WHERE user_id = ?1 RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes.0
    }

    /// The version a delete event for this account must carry.
    pub fn deleted_version(&self) -> i64 {
        self.version + 1
    }

    pub fn permission(&self) -> IdentityPermission {
        IdentityPermission {
            service_account_id: self.id.clone(),
            user_id: self.user_id.clone(),
            scopes: self.scopes().clone(),
            version: self.version,
        }
    }

    pub fn info(&self) -> ServiceAccountInfo {
        ServiceAccountInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            scopes: self.scopes().clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
