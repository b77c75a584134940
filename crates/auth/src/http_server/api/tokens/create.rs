use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::prelude::{RawScopes, ScopeError, Scopes, TokenError};
use common::token::fingerprint;

use super::{expiry, IssuedToken};
use crate::database::models::ApiToken;
use crate::http_server::SessionUser;
use crate::AuthState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    pub scopes: RawScopes,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
    Json(req): Json<CreateTokenRequest>,
) -> Result<impl IntoResponse, CreateTokenError> {
    let user_id = caller.user.id;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(CreateTokenError::InvalidName);
    }
    if req.expires_in_secs == Some(0) {
        return Err(CreateTokenError::InvalidExpiry);
    }
    let scopes = Scopes::for_owner(&req.scopes, &user_id)?;

    let token_id = Uuid::new_v4().to_string();
    let expires_at = expiry(req.expires_in_secs);
    let token = state
        .signer()
        .mint_api_token(&token_id, &user_id, &scopes, expires_at)?;

    ApiToken::create_standalone(
        &token_id,
        &user_id,
        name,
        &scopes,
        &fingerprint(&token),
        expires_at,
        state.database(),
    )
    .await?;
    tracing::info!(%user_id, %token_id, scopes = scopes.len(), "api token created");

    Ok((
        http::StatusCode::CREATED,
        Json(IssuedToken {
            id: token_id,
            token,
            name: name.to_string(),
            service_account_id: None,
            scopes: Some(scopes),
            expires_at,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum CreateTokenError {
    #[error("token name must not be empty")]
    InvalidName,
    #[error("expires_in_secs must be positive")]
    InvalidExpiry,
    #[error("invalid scopes: {0}")]
    Scope(#[from] ScopeError),
    #[error("failed to sign token: {0}")]
    Token(#[from] TokenError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CreateTokenError {
    fn into_response(self) -> Response {
        match self {
            CreateTokenError::InvalidName
            | CreateTokenError::InvalidExpiry
            | CreateTokenError::Scope(_) => {
                tracing::info!(error = %self, "token creation rejected");
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            CreateTokenError::Token(_) | CreateTokenError::Database(_) => {
                tracing::error!("CREATE TOKEN ERROR: {:?}", self);
                (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
