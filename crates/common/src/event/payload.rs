use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::scope::Scopes;

/// User lifecycle event. `display_name` is absent on deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub event_id: Uuid,
    pub entity_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The current grant of a service account at `version`.
///
/// Used both as the `updated` event payload and as a bulk sync record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPermission {
    pub service_account_id: String,
    pub user_id: String,
    pub scopes: Scopes,
    pub version: i64,
}

/// A service account was removed; `version` is one past its last update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDeleted {
    pub service_account_id: String,
    pub user_id: String,
    pub version: i64,
}

/// Response body of the issuer's bulk sync endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityPermissionList {
    pub permissions: Vec<IdentityPermission>,
}
