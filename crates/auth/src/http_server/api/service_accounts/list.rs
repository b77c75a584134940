use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::{ServiceAccount, ServiceAccountInfo};
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
) -> Result<Json<Vec<ServiceAccountInfo>>, ListServiceAccountsError> {
    let accounts = ServiceAccount::list_for_user(&caller.user.id, state.database()).await?;
    Ok(Json(accounts.iter().map(ServiceAccount::info).collect()))
}

#[derive(Debug, thiserror::Error)]
pub enum ListServiceAccountsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ListServiceAccountsError {
    fn into_response(self) -> Response {
        tracing::error!("LIST SERVICE ACCOUNTS ERROR: {:?}", self);
        (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
