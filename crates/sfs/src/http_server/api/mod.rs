use axum::routing::{get, post};
use axum::Router;

pub mod authorize;
pub mod whoami;

use crate::SfsState;

pub fn router(state: SfsState) -> Router<SfsState> {
    Router::new()
        .route("/whoami", get(whoami::handler))
        .route("/authorize", post(authorize::handler))
        .with_state(state)
}
