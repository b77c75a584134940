use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::prelude::{RawScopes, ScopeError, Scopes};

use crate::database::models::ServiceAccount;
use crate::http_server::SessionUser;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceAccountRequest {
    pub name: String,
    pub scopes: RawScopes,
}

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Json(req): Json<CreateServiceAccountRequest>,
) -> Result<impl IntoResponse, CreateServiceAccountError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(CreateServiceAccountError::InvalidName);
    }
    let scopes = Scopes::for_owner(&req.scopes, &caller.user.id)?;

    let account = ServiceAccount::create(&caller.user.id, name, &scopes, state.database()).await?;
    tracing::info!(
        user_id = %account.user_id,
        service_account_id = %account.id,
        version = account.version,
        "service account created"
    );

    state.publisher().identity_updated(&account).await;

    Ok((http::StatusCode::CREATED, Json(account.info())).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum CreateServiceAccountError {
    #[error("service account name must not be empty")]
    InvalidName,
    #[error("invalid scopes: {0}")]
    Scope(#[from] ScopeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CreateServiceAccountError {
    fn into_response(self) -> Response {
        match self {
            CreateServiceAccountError::InvalidName | CreateServiceAccountError::Scope(_) => {
                tracing::info!(error = %self, "service account creation rejected");
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            CreateServiceAccountError::Database(_) => {
                tracing::error!("CREATE SERVICE ACCOUNT ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
