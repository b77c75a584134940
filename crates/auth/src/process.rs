use service::http;
use service::process::{self, LogConfig, ShutdownHandle};

use crate::http_server;
use crate::{AuthState, Config, StateSetupError};

/// Open the bus and database, then spawn the API server.
pub async fn start_service(config: &Config) -> Result<(AuthState, ShutdownHandle), StartupError> {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = process::graceful_shutdown_blocker()?;

    let bus = config.bus.open().await?;
    let state = AuthState::from_config(config, bus).await?;

    let api_state = state.clone();
    let api_config = http::Config::new(config.listen_addr).with_log_level(config.log_level);
    let api_rx = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = http_server::run_api(api_config, api_state, api_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(addr = %config.listen_addr, "issuer running");

    Ok((
        state,
        ShutdownHandle::new(graceful_waiter, vec![api_handle], shutdown_tx),
    ))
}

/// Run the issuer until a shutdown signal. Use for CLI binary usage.
pub async fn spawn_service(config: &Config) -> Result<(), StartupError> {
    let _guards = process::init_logging(
        &LogConfig::new(config.log_level, "ecloud-auth").with_log_dir(config.log_dir.clone()),
    );
    process::report_build_info("auth", env!("CARGO_PKG_VERSION"));

    let (_, handle) = start_service(config).await.map_err(|e| {
        tracing::error!("error creating issuer state: {}", e);
        e
    })?;
    handle.wait().await;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
    #[error("failed to open event bus: {0}")]
    Bus(#[from] service::bus::BusError),
    #[error(transparent)]
    State(#[from] StateSetupError),
}
