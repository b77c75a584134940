//! # Bearer tokens
//!
//! Three kinds of bearer token exist, distinguished by their claims:
//!
//! - **Session** tokens identify a user directly and carry no scopes.
//! - **API** tokens carry an explicit scope grant in their signed claims.
//! - **Service-account** tokens reference a service account; their authority
//!   is whatever that account grants at request time.
//!
//! All three are HS256 JWTs signed with a key shared between the issuer and
//! the consuming services. API and service-account tokens are handed out with
//! an [`API_TOKEN_PREFIX`] so they can be told apart from session tokens at a
//! glance; the prefix is stripped before verification.

mod claims;
mod signer;
mod validator;

pub use claims::{ApiTokenClaims, Claims, ServiceAccountClaims, SessionClaims};
pub use signer::{fingerprint, TokenSigner};
pub use validator::TokenValidator;

use serde::{Deserialize, Serialize};

use crate::scope::Scopes;

/// Marker prepended to API and service-account bearer strings.
pub const API_TOKEN_PREFIX: &str = "ecloud_";

/// Value of the `type` claim carried by API and service-account tokens.
pub const API_TOKEN_TYPE: &str = "api_token";

/// Body of a successful revocation check.
///
/// `scopes` is the token's current grant as the issuer sees it: the stored
/// scopes of a standalone token, or the live grant of a bound token's service
/// account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCheckResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Scopes>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm("mismatch".into()),
            _ => TokenError::Malformed,
        }
    }
}
