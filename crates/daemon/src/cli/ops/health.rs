use clap::Args;
use url::Url;

use ecloud_daemon::state::AppState;

use crate::cli::op::resolve_remote;

const DEFAULT_AUTH_PORT: u16 = 7100;
const DEFAULT_SFS_PORT: u16 = 7200;

#[derive(Args, Debug, Clone)]
pub struct Health {
    /// Issuer url (default: localhost on the configured port)
    #[arg(long)]
    pub auth_url: Option<Url>,

    /// Storage service url (default: localhost on the configured port)
    #[arg(long)]
    pub sfs_url: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

async fn probe(client: &reqwest::Client, base: &Url, name: &str, lines: &mut Vec<String>) {
    lines.push(String::new());
    lines.push(format!("{} ({}):", name, base));

    for check in ["livez", "readyz"] {
        let url = format!("{}/_status/{}", base.as_str().trim_end_matches('/'), check);
        let status = match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => "OK".to_string(),
            Ok(resp) => format!("UNHEALTHY ({})", resp.status()),
            Err(_) => "NOT REACHABLE".to_string(),
        };
        lines.push(format!("  {:<7} {}", format!("{}:", check), status));
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        let (auth_port, sfs_port) = match AppState::load(ctx.config_path.clone()) {
            Ok(state) => {
                lines.push(format!("  directory:   {}", state.ecloud_dir.display()));
                lines.push("  config.toml: OK".to_string());
                lines.push(format!(
                    "  jwt_secret:  {}",
                    if state.config.jwt_secret.is_some() { "set" } else { "MISSING" }
                ));
                lines.push(format!(
                    "  service_key: {}",
                    if state.config.service_key.is_some() { "set" } else { "not set" }
                ));
                (Some(state.config.auth.port), Some(state.config.sfs.port))
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
                (None, None)
            }
        };

        // 2. Probe both services
        let auth_url = resolve_remote(self.auth_url.clone(), auth_port, DEFAULT_AUTH_PORT);
        let sfs_url = resolve_remote(self.sfs_url.clone(), sfs_port, DEFAULT_SFS_PORT);
        probe(&ctx.http, &auth_url, "Issuer", &mut lines).await;
        probe(&ctx.http, &sfs_url, "Storage", &mut lines).await;

        Ok(lines.join("\n"))
    }
}
