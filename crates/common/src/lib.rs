/**
 * Event subjects and payloads exchanged between
 *  the issuer and consuming services.
 */
pub mod event;
/**
 * Scope grammar and the hierarchical permission
 *  matcher. Pure, no I/O.
 */
pub mod scope;
/**
 * Bearer token claims, signing and validation.
 *  Tokens are HS256 JWTs; API tokens carry the
 *  `ecloud_` prefix.
 */
pub mod token;

pub mod prelude {
    pub use crate::event::{
        IdentityAction, IdentityDeleted, IdentityPermission, IdentityPermissionList, Subject,
        UserAction, UserEvent,
    };
    pub use crate::scope::{has_permission, Action, RawScopes, Root, ScopeError, ScopePath, Scopes};
    pub use crate::token::{
        ApiTokenClaims, Claims, ServiceAccountClaims, SessionClaims, TokenCheckResponse, TokenError,
        TokenSigner, TokenValidator,
    };
}
