use axum::routing::{delete, post, put};
use axum::Router;

pub mod create;
pub mod delete;
pub mod list;
pub mod mint_token;
pub mod update_scopes;

use crate::AuthState;

pub fn router(state: AuthState) -> Router<AuthState> {
    Router::new()
        .route("/", post(create::handler).get(list::handler))
        .route("/:id", delete(delete::handler))
        .route("/:id/scopes", put(update_scopes::handler))
        .route("/:id/tokens", post(mint_token::handler))
        .with_state(state)
}
