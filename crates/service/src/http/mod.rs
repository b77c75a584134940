//! HTTP plumbing shared by every service: configuration, bearer extraction,
//! health routes and the server runner.

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

mod bearer;
mod config;
mod handlers;
pub mod health;

pub use bearer::bearer_token;
pub use config::{Config, ConfigError};
pub use handlers::not_found_handler;

pub const API_PREFIX: &str = "/api";
pub const STATUS_PREFIX: &str = "/_status";

/// Bind `config.listen_addr` and serve `router` until `shutdown_rx` fires.
pub async fn serve(
    config: &Config,
    router: Router,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    serve_on(listener, config, router, shutdown_rx).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: &Config,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(config.log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = router.layer(trace_layer);

    tracing::info!(addr = ?listener.local_addr().ok(), "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
