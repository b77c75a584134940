use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::scope::{RawScopes, Scopes};

use super::{TokenError, API_TOKEN_TYPE};

/// Claims as they appear inside the JWT body.
///
/// One struct covers all three token kinds; it never leaves this module.
/// [`Claims`] is the decoded form handed to callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct WireClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<RawScopes>,
}

/// A user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: String,
    pub session_id: String,
    pub expires_at: OffsetDateTime,
}

/// A standalone API token. `scopes` are the grant signed into the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokenClaims {
    pub token_id: String,
    pub user_id: String,
    pub scopes: Scopes,
    pub expires_at: Option<OffsetDateTime>,
}

/// A token bound to a service account. Deliberately has no scopes: they are
/// resolved through the service account at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountClaims {
    pub token_id: String,
    pub user_id: String,
    pub service_account_id: String,
    pub expires_at: Option<OffsetDateTime>,
}

/// Verified claims of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claims {
    Session(SessionClaims),
    ApiToken(ApiTokenClaims),
    ServiceAccount(ServiceAccountClaims),
}

impl Claims {
    pub fn user_id(&self) -> &str {
        match self {
            Claims::Session(c) => &c.user_id,
            Claims::ApiToken(c) => &c.user_id,
            Claims::ServiceAccount(c) => &c.user_id,
        }
    }

    /// The revocation handle of an API or service-account token.
    pub fn token_id(&self) -> Option<&str> {
        match self {
            Claims::Session(_) => None,
            Claims::ApiToken(c) => Some(&c.token_id),
            Claims::ServiceAccount(c) => Some(&c.token_id),
        }
    }
}

fn timestamp(secs: i64) -> Result<OffsetDateTime, TokenError> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|_| TokenError::Malformed)
}

impl TryFrom<WireClaims> for Claims {
    type Error = TokenError;

    fn try_from(wire: WireClaims) -> Result<Self, Self::Error> {
        if wire.sub.is_empty() {
            return Err(TokenError::Malformed);
        }
        let expires_at = wire.exp.map(timestamp).transpose()?;

        if wire.kind.as_deref() != Some(API_TOKEN_TYPE) {
            return Ok(Claims::Session(SessionClaims {
                user_id: wire.sub,
                session_id: wire.jti.ok_or(TokenError::Malformed)?,
                expires_at: expires_at.ok_or(TokenError::Malformed)?,
            }));
        }

        let token_id = wire.jti.ok_or(TokenError::Malformed)?;
        match wire.service_account_id {
            // embedded scopes on a bound token are ignored, they may be stale
            Some(service_account_id) => Ok(Claims::ServiceAccount(ServiceAccountClaims {
                token_id,
                user_id: wire.sub,
                service_account_id,
                expires_at,
            })),
            None => Ok(Claims::ApiToken(ApiTokenClaims {
                token_id,
                user_id: wire.sub,
                scopes: wire
                    .scopes
                    .map(Scopes::from_raw_lenient)
                    .unwrap_or_default(),
                expires_at,
            })),
        }
    }
}
