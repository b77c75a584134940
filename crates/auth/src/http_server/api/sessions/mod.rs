use axum::routing::{delete, post};
use axum::Router;

pub mod create;
pub mod list;
pub mod revoke;

use crate::AuthState;

pub fn router(state: AuthState) -> Router<AuthState> {
    Router::new()
        .route("/", post(create::handler).get(list::handler))
        .route("/:id", delete(revoke::handler))
        .with_state(state)
}
