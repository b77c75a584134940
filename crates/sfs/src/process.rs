use service::http;
use service::process::{self, LogConfig, ShutdownHandle};

use crate::bulk_sync::BulkSync;
use crate::consumer::{EventConsumer, IdentityHandler, UserHandler};
use crate::http_server;
use crate::{Config, SfsState, StateSetupError};

/// Reconcile with the issuer, then spawn the consumers, cache sweepers and
/// the API server.
pub async fn start_service(config: &Config) -> Result<(SfsState, ShutdownHandle), StartupError> {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = process::graceful_shutdown_blocker()?;

    let bus = config.bus.open().await?;
    let state = SfsState::from_config(config, bus.clone()).await?;

    // 1. Catch up before serving; the consumers cover anything after this
    BulkSync::new(state.issuer().clone())
        .run_or_warn(state.permissions())
        .await;

    // 2. Event consumers
    let identity_handle = EventConsumer::new(
        bus.clone(),
        config.identity_durable_name(),
        IdentityHandler::new(state.permissions().clone()),
    )
    .spawn(shutdown_rx.clone());
    let user_handle = EventConsumer::new(
        bus,
        config.user_durable_name(),
        UserHandler::new(state.users().clone()),
    )
    .spawn(shutdown_rx.clone());

    // 3. Cache sweepers
    let permissions_sweeper = state
        .permissions()
        .spawn_sweeper(config.sweep_interval, shutdown_rx.clone());
    let revocation_sweeper = state
        .revocation()
        .spawn_sweeper(config.sweep_interval, shutdown_rx.clone());

    // 4. API
    let api_state = state.clone();
    let api_config = http::Config::new(config.listen_addr).with_log_level(config.log_level);
    let api_rx = shutdown_rx.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = http_server::run_api(api_config, api_state, api_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(
        addr = %config.listen_addr,
        issuer = %config.issuer_url,
        "sfs running"
    );

    Ok((
        state,
        ShutdownHandle::new(
            graceful_waiter,
            vec![
                identity_handle,
                user_handle,
                permissions_sweeper,
                revocation_sweeper,
                api_handle,
            ],
            shutdown_tx,
        ),
    ))
}

/// Run sfs until a shutdown signal. Use for CLI binary usage.
pub async fn spawn_service(config: &Config) -> Result<(), StartupError> {
    let _guards = process::init_logging(
        &LogConfig::new(config.log_level, "ecloud-sfs").with_log_dir(config.log_dir.clone()),
    );
    process::report_build_info("sfs", env!("CARGO_PKG_VERSION"));

    let (_, handle) = start_service(config).await.map_err(|e| {
        tracing::error!("error creating sfs state: {}", e);
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
