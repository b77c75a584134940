use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use super::claims::{Claims, WireClaims};
use super::{TokenError, API_TOKEN_PREFIX};

/// Verifies bearer strings and decodes them into [`Claims`].
///
/// Only HS256 is accepted. `exp` is checked when present; session tokens must
/// carry one, API tokens may not.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::from(["sub".to_string()]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, bearer: &str) -> Result<Claims, TokenError> {
        let jwt = bearer.strip_prefix(API_TOKEN_PREFIX).unwrap_or(bearer);

        // refuse anything but HMAC before touching the key
        let header = jsonwebtoken::decode_header(jwt).map_err(|_| TokenError::Malformed)?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let data = jsonwebtoken::decode::<WireClaims>(jwt, &self.key, &self.validation)?;
        Claims::try_from(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::scope::{Action, RawScopes, Scopes};
    use crate::token::TokenSigner;

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret";

    fn scopes() -> Scopes {
        let mut raw = RawScopes::new();
        raw.insert("storage.u1.files".into(), vec!["read".into()]);
        Scopes::for_owner(&raw, "u1").unwrap()
    }

    #[test]
    fn test_session_round_trip() {
        let signer = TokenSigner::new(SECRET);
        let expires_at = OffsetDateTime::now_utc() + Duration::hours(12);
        let token = signer.mint_session("u1", "s1", expires_at).unwrap();
        assert!(!token.starts_with(API_TOKEN_PREFIX));

        match TokenValidator::new(SECRET).validate(&token).unwrap() {
            Claims::Session(s) => {
                assert_eq!(s.user_id, "u1");
                assert_eq!(s.session_id, "s1");
                assert_eq!(s.expires_at.unix_timestamp(), expires_at.unix_timestamp());
            }
            other => panic!("expected session, got {other:?}"),
        }
    }

    #[test]
    fn test_api_token_carries_scopes() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.mint_api_token("t1", "u1", &scopes(), None).unwrap();
        assert!(token.starts_with(API_TOKEN_PREFIX));

        match TokenValidator::new(SECRET).validate(&token).unwrap() {
            Claims::ApiToken(c) => {
                assert_eq!(c.token_id, "t1");
                assert_eq!(c.expires_at, None);
                assert!(c.scopes.has_permission("storage.u1.files.docs", Action::Read));
            }
            other => panic!("expected api token, got {other:?}"),
        }
    }

    #[test]
    fn test_service_account_token() {
        let signer = TokenSigner::new(SECRET);
        let token = signer
            .mint_service_account_token("t2", "u1", "sa1", None)
            .unwrap();

        let claims = TokenValidator::new(SECRET).validate(&token).unwrap();
        assert_eq!(claims.token_id(), Some("t2"));
        assert!(matches!(
            claims,
            Claims::ServiceAccount(ref c) if c.service_account_id == "sa1" && c.user_id == "u1"
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new(SECRET);
        let expired = OffsetDateTime::now_utc() - Duration::hours(1);
        let token = signer
            .mint_api_token("t1", "u1", &scopes(), Some(expired))
            .unwrap();

        assert_eq!(
            TokenValidator::new(SECRET).validate(&token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenSigner::new(b"another-secret")
            .mint_api_token("t1", "u1", &scopes(), None)
            .unwrap();
        assert_eq!(
            TokenValidator::new(SECRET).validate(&token).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn test_other_algorithms_rejected() {
        let claims = WireClaims {
            sub: "u1".into(),
            jti: Some("t1".into()),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            kind: Some("api_token".into()),
            ..Default::default()
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(matches!(
            TokenValidator::new(SECRET).validate(&token).unwrap_err(),
            TokenError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        // {"alg":"none","typ":"JWT"} . {"sub":"u1","iat":0} . <empty>
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ1MSIsImlhdCI6MH0.";
        assert!(TokenValidator::new(SECRET).validate(token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let validator = TokenValidator::new(SECRET);
        assert_eq!(validator.validate("").unwrap_err(), TokenError::Malformed);
        assert_eq!(
            validator.validate("ecloud_not-a-jwt").unwrap_err(),
            TokenError::Malformed
        );
    }
}
