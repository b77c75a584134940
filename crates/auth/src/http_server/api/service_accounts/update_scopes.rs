use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::prelude::{RawScopes, ScopeError, Scopes};

use crate::database::models::ServiceAccount;
use crate::http_server::SessionUser;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScopesRequest {
    pub scopes: RawScopes,
}

/// Replace an account's scopes. Already issued bound tokens pick up the new
/// grant as soon as consumers apply the published event.
pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateScopesRequest>,
) -> Result<impl IntoResponse, UpdateScopesError> {
    let scopes = Scopes::for_owner(&req.scopes, &caller.user.id)?;

    let account = ServiceAccount::update_scopes(&id, &caller.user.id, &scopes, state.database())
        .await?
        .ok_or_else(|| UpdateScopesError::NotFound(id.clone()))?;
    tracing::info!(
        service_account_id = %account.id,
        version = account.version,
        "service account scopes updated"
    );

    state.publisher().identity_updated(&account).await;

    Ok(Json(account.info()))
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateScopesError {
    #[error("service account not found: {0}")]
    NotFound(String),
    #[error("invalid scopes: {0}")]
    Scope(#[from] ScopeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for UpdateScopesError {
    fn into_response(self) -> Response {
        match self {
            UpdateScopesError::NotFound(_) => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            UpdateScopesError::Scope(_) => {
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            UpdateScopesError::Database(_) => {
                tracing::error!("UPDATE SCOPES ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
