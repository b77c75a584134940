use async_trait::async_trait;

use common::event::IDENTITY_STREAM_FILTER;
use common::prelude::{IdentityAction, IdentityDeleted, IdentityPermission, Subject};

use super::{EventHandler, HandleError, Outcome};
use crate::permissions::PermissionStore;

/// Applies `auth.identity.*` events to the permission store.
#[derive(Debug, Clone)]
pub struct IdentityHandler {
    store: PermissionStore,
}

impl IdentityHandler {
    pub fn new(store: PermissionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for IdentityHandler {
    fn filter_subject(&self) -> &'static str {
        IDENTITY_STREAM_FILTER
    }

    async fn handle(&self, subject: &Subject, payload: &[u8]) -> Result<Outcome, HandleError> {
        let Subject::Identity {
            service_account_id,
            action,
        } = subject
        else {
            return Ok(Outcome::Ignored);
        };

        let outcome = match action {
            IdentityAction::Updated => {
                let permission: IdentityPermission = serde_json::from_slice(payload)?;
                if &permission.service_account_id != service_account_id {
                    tracing::warn!(
                        %subject,
                        payload_id = %permission.service_account_id,
                        "subject and payload disagree on service account, using payload"
                    );
                }
                self.store.apply_update(&permission).await?
            }
            IdentityAction::Deleted => {
                let deleted: IdentityDeleted = serde_json::from_slice(payload)?;
                self.store
                    .apply_delete(&deleted.service_account_id, &deleted.user_id, deleted.version)
                    .await?
            }
        };

        tracing::info!(%subject, ?outcome, "identity event applied");
        Ok(outcome.into())
    }
}
