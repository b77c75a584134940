use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::UserResponse;
use crate::database::models::User;
use crate::http_server::SessionUser;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
}

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, UpdateUserError> {
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let user = User::update_display_name(&caller.user.id, display_name, state.database())
        .await?
        .ok_or(UpdateUserError::NotFound)?;
    tracing::info!(user_id = %user.id, "user updated");

    state.publisher().user_updated(&user).await;

    Ok(Json(UserResponse::from(&user)))
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateUserError {
    #[error("user not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for UpdateUserError {
    fn into_response(self) -> Response {
        match self {
            UpdateUserError::NotFound => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            UpdateUserError::Database(_) => {
                tracing::error!("UPDATE USER ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
