use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::prelude::Scopes;

pub mod check;
pub mod create;
pub mod list;
pub mod revoke;

use crate::AuthState;

pub fn router(state: AuthState) -> Router<AuthState> {
    Router::new()
        .route("/", post(create::handler).get(list::handler))
        .route("/:id", delete(revoke::handler))
        .route("/:id/check", get(check::handler))
        .with_state(state)
}

/// A freshly minted bearer. `token` is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub id: String,
    pub token: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Scopes>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// Absolute expiry for a token that should live `expires_in_secs`.
/// `Some(0)` is rejected by callers before getting here.
pub(crate) fn expiry(expires_in_secs: Option<u64>) -> Option<OffsetDateTime> {
    expires_in_secs.map(|secs| OffsetDateTime::now_utc() + Duration::from_secs(secs))
}
