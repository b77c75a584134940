use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use common::prelude::{Claims, TokenError};
use service::http::bearer_token;

use crate::database::models::{Session, User};
use crate::AuthState;

pub const SERVICE_KEY_HEADER: &str = "x-service-key";

/// The user behind a live session token.
///
/// Management endpoints accept only session tokens: the session row must
/// still exist and be unexpired, so deleting a session revokes its token.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: User,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AuthState> for SessionUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let claims = state
            .validator()
            .validate(&token)
            .map_err(AuthError::InvalidToken)?;
        let Claims::Session(claims) = claims else {
            return Err(AuthError::SessionRequired);
        };

        let db = state.database();
        let now = OffsetDateTime::now_utc();
        let session = Session::get(&claims.session_id, db)
            .await?
            .filter(|s| s.user_id == claims.user_id && s.is_active(now))
            .ok_or(AuthError::SessionRevoked)?;
        let user = User::get(&session.user_id, db)
            .await?
            .ok_or(AuthError::SessionRevoked)?;

        Ok(SessionUser { user, session })
    }
}

/// A consuming service that presented the shared service key.
#[derive(Debug, Clone, Copy)]
pub struct ServiceCaller;

#[async_trait]
impl FromRequestParts<AuthState> for ServiceCaller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState,
    ) -> Result<Self, Self::Rejection> {
        verify_service_key(&parts.headers, state.service_key(), true)?;
        Ok(ServiceCaller)
    }
}

/// Check the `x-service-key` header against `expected`.
///
/// With no key configured, the call is refused when `required` and allowed
/// otherwise.
pub fn verify_service_key(
    headers: &HeaderMap,
    expected: Option<&str>,
    required: bool,
) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return if required {
            Err(AuthError::ServiceKeyNotConfigured)
        } else {
            Ok(())
        };
    };

    let presented = headers
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidServiceKey)?;
    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidServiceKey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(TokenError),
    #[error("this endpoint requires a session token")]
    SessionRequired,
    #[error("session has expired or was revoked")]
    SessionRevoked,
    #[error("invalid service key")]
    InvalidServiceKey,
    #[error("service key is not configured")]
    ServiceKeyNotConfigured,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::SessionRevoked
            | AuthError::InvalidServiceKey => StatusCode::UNAUTHORIZED,
            AuthError::SessionRequired => StatusCode::FORBIDDEN,
            AuthError::ServiceKeyNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Database(e) => {
                tracing::error!(error = %e, "database error while authenticating");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
            }
        };
        tracing::debug!(error = %self, "request rejected");
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert(SERVICE_KEY_HEADER, key.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_service_key() {
        assert!(verify_service_key(&headers(Some("k")), Some("k"), true).is_ok());
        assert!(matches!(
            verify_service_key(&headers(Some("x")), Some("k"), false),
            Err(AuthError::InvalidServiceKey)
        ));
        assert!(matches!(
            verify_service_key(&headers(None), Some("k"), false),
            Err(AuthError::InvalidServiceKey)
        ));
        assert!(verify_service_key(&headers(None), None, false).is_ok());
        assert!(matches!(
            verify_service_key(&headers(Some("k")), None, true),
            Err(AuthError::ServiceKeyNotConfigured)
        ));
    }
}
