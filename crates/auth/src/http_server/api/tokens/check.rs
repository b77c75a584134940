//! Revocation check used by consuming services.
//!
//! 200 with the token's current scopes while it is live, 404 once it is
//! unknown, expired or revoked. Consumers treat any non-200 as a rejection.

use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use time::OffsetDateTime;

use common::prelude::TokenCheckResponse;

use crate::database::models::{ApiToken, ServiceAccount};
use crate::http_server::{verify_service_key, AuthError};
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CheckTokenError> {
    verify_service_key(&headers, state.service_key(), false)?;

    let db = state.database();
    let token = ApiToken::get(&id, db)
        .await?
        .filter(|token| token.is_live(OffsetDateTime::now_utc()))
        .ok_or(CheckTokenError::NotValid)?;

    let scopes = match &token.service_account_id {
        Some(service_account_id) => {
            let account = ServiceAccount::get(service_account_id, db)
                .await?
                .ok_or(CheckTokenError::NotValid)?;
            Some(account.scopes().clone())
        }
        None => token.scopes().cloned(),
    };

    Ok(Json(TokenCheckResponse {
        valid: true,
        scopes,
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum CheckTokenError {
    #[error("token is not valid")]
    NotValid,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CheckTokenError {
    fn into_response(self) -> Response {
        match self {
            CheckTokenError::NotValid => (
                http::StatusCode::NOT_FOUND,
                Json(TokenCheckResponse {
                    valid: false,
                    scopes: None,
                }),
            )
                .into_response(),
            CheckTokenError::Auth(e) => e.into_response(),
            CheckTokenError::Database(_) => {
                tracing::error!("CHECK TOKEN ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
