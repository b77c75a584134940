use jsonwebtoken::{Algorithm, EncodingKey, Header};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::scope::Scopes;

use super::claims::WireClaims;
use super::{TokenError, API_TOKEN_PREFIX, API_TOKEN_TYPE};

const SESSION_TYPE: &str = "session";

/// Mints bearer tokens. Lives only in the issuer.
#[derive(Clone)]
pub struct TokenSigner {
    key: EncodingKey,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
        }
    }

    /// A raw (unprefixed) session JWT.
    pub fn mint_session(
        &self,
        user_id: &str,
        session_id: &str,
        expires_at: OffsetDateTime,
    ) -> Result<String, TokenError> {
        self.sign(&WireClaims {
            sub: user_id.to_string(),
            jti: Some(session_id.to_string()),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            exp: Some(expires_at.unix_timestamp()),
            kind: Some(SESSION_TYPE.to_string()),
            ..Default::default()
        })
    }

    /// A standalone API token carrying `scopes` in its claims.
    pub fn mint_api_token(
        &self,
        token_id: &str,
        user_id: &str,
        scopes: &Scopes,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<String, TokenError> {
        let jwt = self.sign(&WireClaims {
            sub: user_id.to_string(),
            jti: Some(token_id.to_string()),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            exp: expires_at.map(|t| t.unix_timestamp()),
            kind: Some(API_TOKEN_TYPE.to_string()),
            scopes: Some(scopes.to_raw()),
            ..Default::default()
        })?;
        Ok(format!("{API_TOKEN_PREFIX}{jwt}"))
    }

    /// A token bound to `service_account_id`. No scopes are embedded.
    pub fn mint_service_account_token(
        &self,
        token_id: &str,
        user_id: &str,
        service_account_id: &str,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<String, TokenError> {
        let jwt = self.sign(&WireClaims {
            sub: user_id.to_string(),
            jti: Some(token_id.to_string()),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            exp: expires_at.map(|t| t.unix_timestamp()),
            kind: Some(API_TOKEN_TYPE.to_string()),
            service_account_id: Some(service_account_id.to_string()),
            ..Default::default()
        })?;
        Ok(format!("{API_TOKEN_PREFIX}{jwt}"))
    }

    fn sign(&self, claims: &WireClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Hex SHA-256 of a bearer string. The issuer stores this, never the token.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
