use axum::routing::get;
use axum::Router;

pub mod identity_permissions;
pub mod service_accounts;
pub mod sessions;
pub mod tokens;
pub mod users;

use crate::AuthState;

pub fn router(state: AuthState) -> Router<AuthState> {
    Router::new()
        .nest("/users", users::router(state.clone()))
        .nest("/sessions", sessions::router(state.clone()))
        .nest("/tokens", tokens::router(state.clone()))
        .nest("/service-accounts", service_accounts::router(state.clone()))
        .route("/identity-permissions", get(identity_permissions::handler))
        .with_state(state)
}
