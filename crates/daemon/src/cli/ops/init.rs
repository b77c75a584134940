use clap::Args;
use url::Url;

use ecloud_daemon::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Issuer listen port
    #[arg(long, default_value_t = 7100)]
    pub auth_port: u16,

    /// Storage service listen port
    #[arg(long, default_value_t = 7200)]
    pub sfs_port: u16,

    /// Issuer url the storage service talks to (optional, defaults to the local issuer)
    #[arg(long)]
    pub issuer_url: Option<Url>,

    /// Default log level for both services
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] ecloud_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            log_level: self.log_level.clone(),
            ..Default::default()
        };
        config.auth.port = self.auth_port;
        config.sfs.port = self.sfs_port;
        config.sfs.issuer_url = self.issuer_url.clone();
        // fail before anything touches disk
        config.log_level()?;

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let issuer_url = state.config.issuer_url()?;

        let output = format!(
            "Initialized ecloud directory at: {}\n\
             - Config: {}\n\
             - Issuer database: {}\n\
             - Storage database: {}\n\
             - Logs: {}\n\
             - Issuer port: {}\n\
             - Storage port: {}\n\
             - Issuer url: {}\n\
             Secrets were generated and written to the config; keep it private.",
            state.ecloud_dir.display(),
            state.config_path.display(),
            state.auth_db_path.display(),
            state.sfs_db_path.display(),
            state.logs_path.display(),
            state.config.auth.port,
            state.config.sfs.port,
            issuer_url,
        );

        Ok(output)
    }
}
