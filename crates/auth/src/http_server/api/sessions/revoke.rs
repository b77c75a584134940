use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::Session;
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RevokeSessionError> {
    if !Session::delete(&id, &caller.user.id, state.database()).await? {
        return Err(RevokeSessionError::NotFound(id));
    }
    tracing::info!(user_id = %caller.user.id, session_id = %id, "session revoked");
    Ok(http::StatusCode::NO_CONTENT)
}

#[derive(Debug, thiserror::Error)]
pub enum RevokeSessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for RevokeSessionError {
    fn into_response(self) -> Response {
        match self {
            RevokeSessionError::NotFound(_) => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            RevokeSessionError::Database(_) => {
                tracing::error!("REVOKE SESSION ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
