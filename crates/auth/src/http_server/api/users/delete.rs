use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::database::models::User;
use crate::http_server::SessionUser;
use crate::AuthState;

/// Delete the caller's account.
///
/// The user row and every service account go in one transaction; each
/// removed account then gets its own versioned delete event.
pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
) -> Result<impl IntoResponse, DeleteUserError> {
    let user = caller.user;

    let removed = User::delete(&user.id, state.database())
        .await?
        .ok_or(DeleteUserError::NotFound)?;
    tracing::info!(
        user_id = %user.id,
        service_accounts = removed.len(),
        "user deleted"
    );

    for account in &removed {
        state.publisher().identity_deleted(account).await;
    }
    state.publisher().user_deleted(&user).await;

    Ok(http::StatusCode::NO_CONTENT)
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteUserError {
    #[error("user not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for DeleteUserError {
    fn into_response(self) -> Response {
        match self {
            DeleteUserError::NotFound => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            DeleteUserError::Database(_) => {
                tracing::error!("DELETE USER ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
