//! Best-effort publication of permission and user lifecycle events.
//!
//! Every method is called after the corresponding write has committed. A
//! failed publish is logged and dropped: the caller's request still succeeds,
//! and consumers converge through a later event or their next bulk sync.

use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use common::prelude::{IdentityAction, IdentityDeleted, Subject, UserAction, UserEvent};
use service::DynBus;

use crate::database::models::{ServiceAccount, User};

#[derive(Clone)]
pub struct EventPublisher {
    bus: DynBus,
    source: String,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("source", &self.source)
            .finish()
    }
}

impl EventPublisher {
    pub fn new(bus: DynBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }

    pub async fn identity_updated(&self, account: &ServiceAccount) {
        let subject = Subject::identity(&account.id, IdentityAction::Updated);
        self.publish(subject, &account.permission()).await;
    }

    /// `account` is the row as it was just before deletion.
    pub async fn identity_deleted(&self, account: &ServiceAccount) {
        let subject = Subject::identity(&account.id, IdentityAction::Deleted);
        let payload = IdentityDeleted {
            service_account_id: account.id.clone(),
            user_id: account.user_id.clone(),
            version: account.deleted_version(),
        };
        self.publish(subject, &payload).await;
    }

    pub async fn user_created(&self, user: &User) {
        self.user_event(UserAction::Created, user).await;
    }

    pub async fn user_updated(&self, user: &User) {
        self.user_event(UserAction::Updated, user).await;
    }

    pub async fn user_deleted(&self, user: &User) {
        self.user_event(UserAction::Deleted, user).await;
    }

    async fn user_event(&self, action: UserAction, user: &User) {
        let (timestamp, display_name) = match action {
            UserAction::Deleted => (OffsetDateTime::now_utc(), None),
            _ => (user.updated_at, user.display_name.clone()),
        };
        let payload = UserEvent {
            event_id: Uuid::new_v4(),
            entity_id: user.id.clone(),
            timestamp,
            source: self.source.clone(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            display_name,
        };
        self.publish(Subject::user(&user.id, action), &payload).await;
    }

    async fn publish<T: Serialize>(&self, subject: Subject, payload: &T) {
        let subject = subject.to_string();
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::error!(%subject, error = %e, "failed to encode event");
                return;
            }
        };

        match self.bus.publish(&subject, bytes).await {
            Ok(()) => tracing::debug!(%subject, "event published"),
            Err(e) => tracing::error!(%subject, error = %e, "failed to publish event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use sqlx::types::Json;

    use common::prelude::{IdentityPermission, RawScopes, Scopes};
    use service::bus::{BusError, ConsumerSpec, EventBus, Subscription};
    use service::MemoryBus;

    use super::*;

    fn account(version: i64) -> ServiceAccount {
        let raw: RawScopes =
            serde_json::from_value(serde_json::json!({"storage.u1.files": ["read"]})).unwrap();
        ServiceAccount {
            id: "sa1".into(),
            user_id: "u1".into(),
            name: "backup".into(),
            scopes: Json(Scopes::for_owner(&raw, "u1").unwrap()),
            version,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_identity_events_carry_versions() {
        let bus = MemoryBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), "auth");

        publisher.identity_updated(&account(2)).await;
        publisher.identity_deleted(&account(2)).await;

        let messages = bus.messages("auth.identity.>");
        assert_eq!(messages.len(), 2);

        let (subject, payload) = &messages[0];
        assert_eq!(subject, "auth.identity.sa1.updated");
        let update: IdentityPermission = serde_json::from_slice(payload).unwrap();
        assert_eq!(update.version, 2);
        assert!(update.scopes.has_permission("storage.u1.files", common::prelude::Action::Read));

        let (subject, payload) = &messages[1];
        assert_eq!(subject, "auth.identity.sa1.deleted");
        let delete: IdentityDeleted = serde_json::from_slice(payload).unwrap();
        assert_eq!(delete.version, 3);
    }

    struct BrokenBus;

    #[async_trait]
    impl EventBus for BrokenBus {
        async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), BusError> {
            Err(BusError::InvalidLocation("bus is down".into()))
        }

        async fn subscribe(
            &self,
            _spec: ConsumerSpec,
        ) -> Result<Box<dyn Subscription>, BusError> {
            Err(BusError::InvalidLocation("bus is down".into()))
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = EventPublisher::new(Arc::new(BrokenBus), "auth");
        // must return normally
        publisher.identity_updated(&account(1)).await;
    }
}
