//! Request authentication and authorization.

use std::sync::Arc;

use serde::Serialize;

use common::prelude::{Action, Claims, ScopePath, Scopes, TokenError, TokenValidator};

use crate::permissions::{PermissionStore, StoreError};
use crate::revocation::RevocationCache;

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// A user acting through a session; owns everything under their user id.
    User { user_id: String },
    ApiToken {
        token_id: String,
        user_id: String,
        scopes: Scopes,
    },
    ServiceAccount {
        token_id: String,
        user_id: String,
        service_account_id: String,
        scopes: Scopes,
    },
}

impl Principal {
    pub fn user_id(&self) -> &str {
        match self {
            Principal::User { user_id }
            | Principal::ApiToken { user_id, .. }
            | Principal::ServiceAccount { user_id, .. } => user_id,
        }
    }

    pub fn authorize(&self, scope: &str, action: Action) -> bool {
        match self {
            Principal::User { user_id } => ScopePath::parse(scope)
                .map(|path| path.user_id() == user_id)
                .unwrap_or(false),
            Principal::ApiToken { scopes, .. } | Principal::ServiceAccount { scopes, .. } => {
                scopes.has_permission(scope, action)
            }
        }
    }
}

/// Turns a bearer string into a [`Principal`].
#[derive(Clone)]
pub struct Authenticator {
    validator: TokenValidator,
    revocation: Arc<RevocationCache>,
    permissions: PermissionStore,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("revocation", &self.revocation)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl Authenticator {
    pub fn new(
        validator: TokenValidator,
        revocation: Arc<RevocationCache>,
        permissions: PermissionStore,
    ) -> Self {
        Self {
            validator,
            revocation,
            permissions,
        }
    }

    pub async fn authenticate(&self, bearer: &str) -> Result<Principal, AuthenticationError> {
        match self.validator.validate(bearer)? {
            Claims::Session(claims) => Ok(Principal::User {
                user_id: claims.user_id,
            }),
            Claims::ApiToken(claims) => {
                let check = self.revocation.check_token(&claims.token_id).await;
                if !check.valid {
                    return Err(AuthenticationError::Revoked);
                }
                Ok(Principal::ApiToken {
                    scopes: check.scopes.unwrap_or(claims.scopes),
                    token_id: claims.token_id,
                    user_id: claims.user_id,
                })
            }
            Claims::ServiceAccount(claims) => {
                let check = self.revocation.check_token(&claims.token_id).await;
                if !check.valid {
                    return Err(AuthenticationError::Revoked);
                }
                let scopes = self
                    .permissions
                    .get_scopes(&claims.service_account_id)
                    .await?
                    .unwrap_or_else(|| {
                        tracing::debug!(
                            service_account_id = %claims.service_account_id,
                            "no local grant for service account"
                        );
                        Scopes::default()
                    });
                Ok(Principal::ServiceAccount {
                    token_id: claims.token_id,
                    user_id: claims.user_id,
                    service_account_id: claims.service_account_id,
                    scopes,
                })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("token has been revoked")]
    Revoked,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use common::prelude::{IdentityPermission, RawScopes, Root, TokenSigner};
    use time::OffsetDateTime;

    use super::*;
    use crate::database::Database;
    use crate::revocation::{RevocationSource, RevocationStatus};

    const SECRET: &[u8] = b"test-secret";

    struct Fixed(RevocationStatus);

    #[async_trait]
    impl RevocationSource for Fixed {
        async fn check(&self, _token_id: &str) -> RevocationStatus {
            self.0.clone()
        }
    }

    fn scopes(value: serde_json::Value) -> Scopes {
        let raw: RawScopes = serde_json::from_value(value).unwrap();
        Scopes::from_raw_lenient(raw)
    }

    async fn authenticator(status: RevocationStatus) -> Authenticator {
        let db = Database::connect(None).await.unwrap();
        let permissions = PermissionStore::new(db, Root::Storage, Duration::from_secs(300));
        permissions
            .apply_update(&IdentityPermission {
                service_account_id: "sa1".into(),
                user_id: "u1".into(),
                scopes: scopes(serde_json::json!({"storage.u1.files": ["read"]})),
                version: 1,
            })
            .await
            .unwrap();
        let revocation = RevocationCache::new(Arc::new(Fixed(status)), Duration::from_secs(300));
        Authenticator::new(TokenValidator::new(SECRET), Arc::new(revocation), permissions)
    }

    #[test]
    fn test_session_owns_its_user_segment() {
        let user = Principal::User {
            user_id: "u1".into(),
        };
        assert!(user.authorize("storage.u1.files.docs", Action::Delete));
        assert!(user.authorize("storage.u1", Action::Read));
        assert!(!user.authorize("storage.u2.files", Action::Read));
        assert!(!user.authorize("not-a-scope", Action::Read));
    }

    #[tokio::test]
    async fn test_api_token_prefers_fresher_scopes() {
        let fresher = scopes(serde_json::json!({"storage.u1.shares": ["read"]}));
        let auth = authenticator(RevocationStatus::Valid {
            scopes: Some(fresher),
        })
        .await;
        let token = TokenSigner::new(SECRET)
            .mint_api_token(
                "t1",
                "u1",
                &scopes(serde_json::json!({"storage.u1.files": ["read"]})),
                None,
            )
            .unwrap();

        let principal = auth.authenticate(&token).await.unwrap();
        assert!(principal.authorize("storage.u1.shares", Action::Read));
        assert!(!principal.authorize("storage.u1.files", Action::Read));
    }

    #[tokio::test]
    async fn test_failed_open_api_token_uses_claims() {
        let auth = authenticator(RevocationStatus::Unreachable).await;
        let token = TokenSigner::new(SECRET)
            .mint_api_token(
                "t1",
                "u1",
                &scopes(serde_json::json!({"storage.u1.files": ["read"]})),
                None,
            )
            .unwrap();

        let principal = auth.authenticate(&token).await.unwrap();
        assert!(principal.authorize("storage.u1.files", Action::Read));
    }

    #[tokio::test]
    async fn test_revoked_tokens_are_rejected() {
        let auth = authenticator(RevocationStatus::Rejected).await;
        let signer = TokenSigner::new(SECRET);
        let api = signer
            .mint_api_token(
                "t1",
                "u1",
                &scopes(serde_json::json!({"storage.u1": ["read"]})),
                None,
            )
            .unwrap();
        let bound = signer
            .mint_service_account_token("t2", "u1", "sa1", None)
            .unwrap();

        assert!(matches!(
            auth.authenticate(&api).await,
            Err(AuthenticationError::Revoked)
        ));
        assert!(matches!(
            auth.authenticate(&bound).await,
            Err(AuthenticationError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_service_account_scopes_come_from_store() {
        // whatever the issuer says about scopes, a bound token uses the store
        let auth = authenticator(RevocationStatus::Valid {
            scopes: Some(scopes(serde_json::json!({"storage.u1": ["delete"]}))),
        })
        .await;
        let signer = TokenSigner::new(SECRET);

        let bound = signer
            .mint_service_account_token("t2", "u1", "sa1", None)
            .unwrap();
        let principal = auth.authenticate(&bound).await.unwrap();
        assert!(principal.authorize("storage.u1.files", Action::Read));
        assert!(!principal.authorize("storage.u1.files", Action::Delete));

        let unknown = signer
            .mint_service_account_token("t3", "u1", "sa-unknown", None)
            .unwrap();
        let principal = auth.authenticate(&unknown).await.unwrap();
        assert!(!principal.authorize("storage.u1.files", Action::Read));
    }

    #[tokio::test]
    async fn test_session_is_not_revocation_checked() {
        let auth = authenticator(RevocationStatus::Rejected).await;
        let session = TokenSigner::new(SECRET)
            .mint_session(
                "u1",
                "s1",
                OffsetDateTime::now_utc() + time::Duration::hours(1),
            )
            .unwrap();
        assert_eq!(
            auth.authenticate(&session).await.unwrap(),
            Principal::User {
                user_id: "u1".into()
            }
        );
    }
}
