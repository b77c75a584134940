use clap::Args;

use ecloud_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Auth {
    /// Override the issuer port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for log files (defaults to the logs/ directory next to the config)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("state error: {0}")]
    StateError(#[from] ecloud_daemon::state::StateError),

    #[error("issuer failed: {0}")]
    Failed(#[from] auth::process::StartupError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Auth {
    type Error = AuthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let log_dir = self.log_dir.clone().unwrap_or(state.logs_path.clone());
        let config = state.auth_config(self.port, Some(log_dir))?;

        auth::process::spawn_service(&config).await?;
        Ok("issuer stopped".to_string())
    }
}
