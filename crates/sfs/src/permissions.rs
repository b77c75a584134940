//! Local replica of service account grants.
//!
//! Records are written only from identity events and bulk sync, and every
//! write is gated on the account's version: a write lands only if its version
//! is strictly greater than the stored one. Deletes leave a tombstone that
//! keeps its version, so an update that arrives after the delete is refused.
//!
//! Reads go through a short-lived cache that is invalidated after each local
//! write.

use std::sync::Arc;
use std::time::Duration;

use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::prelude::{IdentityPermission, Root, Scopes};
use service::{Clock, TtlCache};

use crate::database::Database;

/// Result of a version-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The stored record is at the same or a newer version; nothing changed.
    Stale,
}

#[derive(Debug, Clone, FromRow)]
pub struct PermissionRecord {
    pub service_account_id: String,
    pub user_id: String,
    pub scopes: Option<Json<Scopes>>,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct PermissionStore {
    db: Database,
    root: Root,
    cache: Arc<TtlCache<String, Option<Scopes>>>,
}

impl std::fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionStore")
            .field("root", &self.root)
            .field("cache", &self.cache)
            .finish()
    }
}

impl PermissionStore {
    pub fn new(db: Database, root: Root, ttl: Duration) -> Self {
        Self::with_cache(db, root, TtlCache::new(ttl))
    }

    pub fn with_clock(db: Database, root: Root, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_cache(db, root, TtlCache::with_clock(ttl, clock))
    }

    fn with_cache(db: Database, root: Root, cache: TtlCache<String, Option<Scopes>>) -> Self {
        Self {
            db,
            root,
            cache: Arc::new(cache),
        }
    }

    pub fn root(&self) -> Root {
        self.root
    }

    /// Current grant of a service account under this service's root.
    /// `None` when the account is unknown or deleted.
    pub async fn get_scopes(&self, service_account_id: &str) -> Result<Option<Scopes>, StoreError> {
        let key = service_account_id.to_string();
        if let Some(scopes) = self.cache.get(&key) {
            return Ok(scopes);
        }

        let epoch = self.cache.epoch();
        let scopes = self
            .get_record(service_account_id)
            .await?
            .filter(|record| !record.deleted)
            .and_then(|record| record.scopes)
            .map(|Json(scopes)| scopes);
        // an event applied during the read has already invalidated this key
        self.cache.insert_if_current(key, epoch, scopes.clone());
        Ok(scopes)
    }

    /// The stored row, tombstones included. Bypasses the cache.
    pub async fn get_record(
        &self,
        service_account_id: &str,
    ) -> Result<Option<PermissionRecord>, StoreError> {
        let record = sqlx::query_as::<_, PermissionRecord>(
            r#"
            SELECT service_account_id, user_id, scopes, version, deleted, updated_at
            FROM identity_permissions
            WHERE service_account_id = ?1
            "#,
        )
        .bind(service_account_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    pub fn invalidate(&self, service_account_id: &str) {
        self.cache.invalidate(&service_account_id.to_string());
    }

    /// Store `permission` if it is newer than what we have.
    ///
    /// Scopes outside this service's root are dropped first. A grant left
    /// empty is recorded as a delete at the same version.
    pub async fn apply_update(
        &self,
        permission: &IdentityPermission,
    ) -> Result<ApplyOutcome, StoreError> {
        let scopes = permission.scopes.retain_root(self.root);
        if scopes.is_empty() {
            tracing::debug!(
                service_account_id = %permission.service_account_id,
                version = permission.version,
                root = %self.root,
                "grant has no scopes under this root, recording as deleted"
            );
            return self
                .apply_delete(
                    &permission.service_account_id,
                    &permission.user_id,
                    permission.version,
                )
                .await;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO identity_permissions
                (service_account_id, user_id, scopes, version, deleted, updated_at)
            VALUES (?1, ?2, ?3, ?4, FALSE, ?5)
            ON CONFLICT(service_account_id) DO UPDATE SET
                user_id = excluded.user_id,
                scopes = excluded.scopes,
                version = excluded.version,
                deleted = FALSE,
                updated_at = excluded.updated_at
            WHERE excluded.version > identity_permissions.version
            "#,
        )
        .bind(&permission.service_account_id)
        .bind(&permission.user_id)
        .bind(Json(&scopes))
        .bind(permission.version)
        .bind(OffsetDateTime::now_utc())
        .execute(&*self.db)
        .await?;

        self.invalidate(&permission.service_account_id);
        Ok(outcome(result.rows_affected()))
    }

    /// Tombstone a service account at `version` if that is newer than what we
    /// have. Unknown accounts get a tombstone too.
    pub async fn apply_delete(
        &self,
        service_account_id: &str,
        user_id: &str,
        version: i64,
    ) -> Result<ApplyOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO identity_permissions
                (service_account_id, user_id, scopes, version, deleted, updated_at)
            VALUES (?1, ?2, NULL, ?3, TRUE, ?4)
            ON CONFLICT(service_account_id) DO UPDATE SET
                user_id = excluded.user_id,
                scopes = NULL,
                version = excluded.version,
                deleted = TRUE,
                updated_at = excluded.updated_at
            WHERE excluded.version > identity_permissions.version
            "#,
        )
        .bind(service_account_id)
        .bind(user_id)
        .bind(version)
        .bind(OffsetDateTime::now_utc())
        .execute(&*self.db)
        .await?;

        self.invalidate(service_account_id);
        Ok(outcome(result.rows_affected()))
    }

    pub fn spawn_sweeper(&self, interval: Duration, shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        self.cache.spawn_sweeper("permissions", interval, shutdown)
    }
}

fn outcome(rows_affected: u64) -> ApplyOutcome {
    if rows_affected > 0 {
        ApplyOutcome::Applied
    } else {
        ApplyOutcome::Stale
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission store error: {0}")]
    Database(#[from] sqlx::Error),
}
