use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::UserResponse;
use crate::database::is_unique_violation;
use crate::database::models::User;
use crate::password::{hash_password, PasswordError};
use crate::AuthState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
}

pub async fn handler(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, RegisterError> {
    let username = req.username.trim();
    if username.is_empty() || username.contains(char::is_whitespace) {
        return Err(RegisterError::InvalidUsername);
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(RegisterError::WeakPassword);
    }

    let password_hash = hash_password(&req.password)?;
    let user = User::create(
        username,
        req.display_name.as_deref(),
        &password_hash,
        state.database(),
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            RegisterError::UsernameTaken
        } else {
            RegisterError::Database(e)
        }
    })?;
    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    state.publisher().user_created(&user).await;

    Ok((http::StatusCode::CREATED, Json(UserResponse::from(&user))).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("username must be non-empty and contain no whitespace")]
    InvalidUsername,
    #[error("password must be at least 8 characters")]
    WeakPassword,
    #[error("username is already taken")]
    UsernameTaken,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        match self {
            RegisterError::InvalidUsername | RegisterError::WeakPassword => {
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            RegisterError::UsernameTaken => {
                (http::StatusCode::CONFLICT, self.to_string()).into_response()
            }
            RegisterError::Password(_) | RegisterError::Database(_) => {
                tracing::error!("REGISTER ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
