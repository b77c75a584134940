use clap::Args;
use url::Url;

use ecloud_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Sfs {
    /// Override the storage service port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Issuer base url (default from config, else the local issuer port)
    #[arg(long)]
    pub issuer_url: Option<Url>,

    /// Directory for log files (defaults to the logs/ directory next to the config)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SfsError {
    #[error("state error: {0}")]
    StateError(#[from] ecloud_daemon::state::StateError),

    #[error("storage service failed: {0}")]
    Failed(#[from] sfs::process::StartupError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sfs {
    type Error = SfsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = AppState::load(ctx.config_path.clone())?;
        if let Some(url) = &self.issuer_url {
            state.config.sfs.issuer_url = Some(url.clone());
        }
        let log_dir = self.log_dir.clone().unwrap_or(state.logs_path.clone());
        let config = state.sfs_config(self.port, Some(log_dir))?;

        sfs::process::spawn_service(&config).await?;
        Ok("storage service stopped".to_string())
    }
}
