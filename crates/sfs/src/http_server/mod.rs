use axum::Router;
use tokio::sync::watch;

use service::http::{self, not_found_handler, HttpServerError, API_PREFIX, STATUS_PREFIX};

pub mod api;
mod extractors;

pub use extractors::{ApiError, Caller};

use crate::SfsState;

pub fn router(state: SfsState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, http::health::router(state.clone()))
        .nest(API_PREFIX, api::router(state.clone()))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_api(
    config: http::Config,
    state: SfsState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    http::serve(&config, router(state), shutdown_rx).await
}
