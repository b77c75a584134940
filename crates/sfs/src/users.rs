//! Local directory of the issuer's users, fed by user lifecycle events.
//!
//! User events carry no version, so writes are ordered by the event
//! timestamp instead: a row only changes for a strictly newer event.

use serde::Serialize;
use sqlx::FromRow;

use common::prelude::UserEvent;

use crate::database::Database;
use crate::permissions::{ApplyOutcome, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DirectoryUser {
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<DirectoryUser>, StoreError> {
        let user = sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT user_id, username, display_name
            FROM users
            WHERE user_id = ?1 AND deleted = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// Record a created or updated user.
    pub async fn apply_upsert(&self, event: &UserEvent) -> Result<ApplyOutcome, StoreError> {
        self.write(event, false).await
    }

    /// Record a deleted user. The row stays behind as a tombstone so an
    /// older update can't bring it back.
    pub async fn apply_delete(&self, event: &UserEvent) -> Result<ApplyOutcome, StoreError> {
        self.write(event, true).await
    }

    async fn write(&self, event: &UserEvent, deleted: bool) -> Result<ApplyOutcome, StoreError> {
        let event_timestamp = i64::try_from(event.timestamp.unix_timestamp_nanos())
            .unwrap_or(i64::MAX);
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, display_name, event_timestamp, deleted)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                display_name = excluded.display_name,
                event_timestamp = excluded.event_timestamp,
                deleted = excluded.deleted
            WHERE excluded.event_timestamp > users.event_timestamp
            "#,
        )
        .bind(&event.user_id)
        .bind(&event.username)
        .bind(&event.display_name)
        .bind(event_timestamp)
        .bind(deleted)
        .execute(&*self.db)
        .await?;

        Ok(if result.rows_affected() > 0 {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Stale
        })
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use super::*;

    fn event(at: OffsetDateTime, display_name: Option<&str>) -> UserEvent {
        UserEvent {
            event_id: Uuid::new_v4(),
            entity_id: "u1".into(),
            timestamp: at,
            source: "auth".into(),
            user_id: "u1".into(),
            username: "alice".into(),
            display_name: display_name.map(str::to_string),
        }
    }

    async fn directory() -> UserDirectory {
        UserDirectory::new(Database::connect(None).await.unwrap())
    }

    #[tokio::test]
    async fn test_newer_event_wins() {
        let users = directory().await;
        let t0 = OffsetDateTime::now_utc();

        users.apply_upsert(&event(t0, Some("Alice"))).await.unwrap();
        assert_eq!(
            users
                .apply_upsert(&event(t0 - Duration::seconds(1), Some("Old")))
                .await
                .unwrap(),
            ApplyOutcome::Stale
        );
        users
            .apply_upsert(&event(t0 + Duration::seconds(1), Some("Alice B")))
            .await
            .unwrap();

        let user = users.get("u1").await.unwrap().unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Alice B"));
    }

    #[tokio::test]
    async fn test_delete_hides_user_and_blocks_older_update() {
        let users = directory().await;
        let t0 = OffsetDateTime::now_utc();

        users.apply_upsert(&event(t0, Some("Alice"))).await.unwrap();
        users
            .apply_delete(&event(t0 + Duration::seconds(2), None))
            .await
            .unwrap();
        assert!(users.get("u1").await.unwrap().is_none());

        assert_eq!(
            users
                .apply_upsert(&event(t0 + Duration::seconds(1), Some("Late")))
                .await
                .unwrap(),
            ApplyOutcome::Stale
        );
        assert!(users.get("u1").await.unwrap().is_none());
    }
}
