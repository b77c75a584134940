//! Login: exchange a username and password for a session token.

use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::prelude::TokenError;

use crate::database::models::{Session, User};
use crate::password::verify_password;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub session_id: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

pub async fn handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, LoginError> {
    let db = state.database();
    let user = User::get_by_username(req.username.trim(), db)
        .await?
        .filter(|user| verify_password(&req.password, &user.password_hash))
        .ok_or(LoginError::InvalidCredentials)?;

    let expires_at = OffsetDateTime::now_utc() + state.session_ttl();
    let session = Session::create(&user.id, client_ip(&headers).as_deref(), expires_at, db).await?;
    let token = state
        .signer()
        .mint_session(&user.id, &session.id, session.expires_at)?;
    tracing::info!(user_id = %user.id, session_id = %session.id, "session created");

    Ok((
        http::StatusCode::CREATED,
        Json(LoginResponse {
            token,
            session_id: session.id,
            user_id: user.id,
            expires_at: session.expires_at,
        }),
    )
        .into_response())
}

/// First hop of `x-forwarded-for`, as set by the gateway.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("failed to sign session token: {0}")]
    Token(#[from] TokenError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::InvalidCredentials => {
                tracing::info!("login rejected");
                (http::StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            LoginError::Token(_) | LoginError::Database(_) => {
                tracing::error!("LOGIN ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
