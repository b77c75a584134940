use axum::async_trait;
use axum::extract::{FromRequestParts, Json};
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use http::StatusCode;
use serde_json::json;

use service::http::bearer_token;

use crate::principal::{AuthenticationError, Principal};
use crate::SfsState;

/// The authenticated principal of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

#[async_trait]
impl FromRequestParts<SfsState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SfsState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::MissingToken)?;
        let principal = state.authenticator().authenticate(&token).await?;
        Ok(Caller(principal))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing bearer token")]
    MissingToken,
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("not permitted to {action} on {scope}")]
    Forbidden { scope: String, action: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingToken
            | ApiError::Authentication(AuthenticationError::InvalidToken(_))
            | ApiError::Authentication(AuthenticationError::Revoked) => {
                tracing::info!(error = %self, "request not authenticated");
                StatusCode::UNAUTHORIZED
            }
            ApiError::Forbidden { .. } => {
                tracing::info!(error = %self, "request not authorized");
                StatusCode::FORBIDDEN
            }
            ApiError::Authentication(AuthenticationError::Store(_)) => {
                tracing::error!("AUTHENTICATION ERROR: {:?}", self);
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
            }
        };
        (status, Json(json!({ "msg": self.to_string() }))).into_response()
    }
}
