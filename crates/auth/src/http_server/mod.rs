use axum::Router;
use tokio::sync::watch;

use service::http::{self, not_found_handler, HttpServerError, API_PREFIX, STATUS_PREFIX};

pub mod api;
mod extractors;

pub use extractors::{verify_service_key, AuthError, ServiceCaller, SessionUser, SERVICE_KEY_HEADER};

use crate::AuthState;

/// The complete issuer application: status routes, the REST API and a JSON
/// fallback, with state applied.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, http::health::router(state.clone()))
        .nest(API_PREFIX, api::router(state.clone()))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_api(
    config: http::Config,
    state: AuthState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    http::serve(&config, router(state), shutdown_rx).await
}
