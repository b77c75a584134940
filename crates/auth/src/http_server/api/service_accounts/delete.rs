use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::ServiceAccount;
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, DeleteServiceAccountError> {
    let account = ServiceAccount::delete(&id, &caller.user.id, state.database())
        .await?
        .ok_or(DeleteServiceAccountError::NotFound(id))?;
    tracing::info!(
        service_account_id = %account.id,
        version = account.deleted_version(),
        "service account deleted"
    );

    state.publisher().identity_deleted(&account).await;

    Ok(http::StatusCode::NO_CONTENT)
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteServiceAccountError {
    #[error("service account not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for DeleteServiceAccountError {
    fn into_response(self) -> Response {
        match self {
            DeleteServiceAccountError::NotFound(_) => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            DeleteServiceAccountError::Database(_) => {
                tracing::error!("DELETE SERVICE ACCOUNT ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
