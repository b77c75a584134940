use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::prelude::TokenError;
use common::token::fingerprint;

use crate::database::models::{ApiToken, ServiceAccount};
use crate::http_server::api::tokens::{expiry, IssuedToken};
use crate::http_server::SessionUser;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintTokenRequest {
    pub name: String,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

/// Issue a token bound to the account. It carries no scopes of its own.
pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Path(id): Path<String>,
    Json(req): Json<MintTokenRequest>,
) -> Result<impl IntoResponse, MintTokenError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(MintTokenError::InvalidName);
    }
    if req.expires_in_secs == Some(0) {
        return Err(MintTokenError::InvalidExpiry);
    }

    let db = state.database();
    let account = ServiceAccount::get_owned(&id, &caller.user.id, db)
        .await?
        .ok_or_else(|| MintTokenError::NotFound(id.clone()))?;

    let token_id = Uuid::new_v4().to_string();
    let expires_at = expiry(req.expires_in_secs);
    let token = state.signer().mint_service_account_token(
        &token_id,
        &account.user_id,
        &account.id,
        expires_at,
    )?;

    ApiToken::create_bound(
        &token_id,
        &account.user_id,
        &account.id,
        name,
        &fingerprint(&token),
        expires_at,
        db,
    )
    .await?;
    tracing::info!(
        service_account_id = %account.id,
        %token_id,
        "service account token created"
    );

    Ok((
        http::StatusCode::CREATED,
        Json(IssuedToken {
            id: token_id,
            token,
            name: name.to_string(),
            service_account_id: Some(account.id),
            scopes: None,
            expires_at,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum MintTokenError {
    #[error("token name must not be empty")]
    InvalidName,
    #[error("expires_in_secs must be positive")]
    InvalidExpiry,
    #[error("service account not found: {0}")]
    NotFound(String),
    #[error("failed to sign token: {0}")]
    Token(#[from] TokenError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for MintTokenError {
    fn into_response(self) -> Response {
        match self {
            MintTokenError::InvalidName | MintTokenError::InvalidExpiry => {
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            MintTokenError::NotFound(_) => {
                (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            MintTokenError::Token(_) | MintTokenError::Database(_) => {
                tracing::error!("MINT TOKEN ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
