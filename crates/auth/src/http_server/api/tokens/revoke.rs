use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::ApiToken;
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RevokeTokenError> {
    if !ApiToken::revoke(&id, &caller.user.id, state.database()).await? {
        return Err(RevokeTokenError::NotFound(id));
    }
    tracing::info!(user_id = %caller.user.id, token_id = %id, "api token revoked");
    Ok(http::StatusCode::NO_CONTENT)
}

#[derive(Debug, thiserror::Error)]
pub enum RevokeTokenError {
    #[error("token not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for RevokeTokenError {
    fn into_response(self) -> Response {
        match self {
            RevokeTokenError::NotFound(_) => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            RevokeTokenError::Database(_) => {
                tracing::error!("REVOKE TOKEN ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
