use async_trait::async_trait;

use common::event::USER_STREAM_FILTER;
use common::prelude::{Subject, UserAction, UserEvent};

use super::{EventHandler, HandleError, Outcome};
use crate::users::UserDirectory;

/// Applies `auth.user.*` events to the local user directory.
///
/// Permission records of a deleted user are left alone; the issuer removes
/// the user's service accounts first and publishes an identity delete for
/// each of them.
#[derive(Debug, Clone)]
pub struct UserHandler {
    users: UserDirectory,
}

impl UserHandler {
    pub fn new(users: UserDirectory) -> Self {
        Self { users }
    }
}

#[async_trait]
impl EventHandler for UserHandler {
    fn filter_subject(&self) -> &'static str {
        USER_STREAM_FILTER
    }

    async fn handle(&self, subject: &Subject, payload: &[u8]) -> Result<Outcome, HandleError> {
        let Subject::User { action, .. } = subject else {
            return Ok(Outcome::Ignored);
        };

        let event: UserEvent = serde_json::from_slice(payload)?;
        let outcome = match action {
            UserAction::Created | UserAction::Updated => self.users.apply_upsert(&event).await?,
            UserAction::Deleted => self.users.apply_delete(&event).await?,
        };

        tracing::debug!(%subject, ?outcome, "user event applied");
        Ok(outcome.into())
    }
}
