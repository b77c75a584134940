use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use common::prelude::Root;
use service::cache::DEFAULT_TTL;
use service::BusConfig;

/// The scope root this service enforces.
pub const SERVICE_ROOT: Root = Root::Storage;
pub const DEFAULT_DURABLE_PREFIX: &str = "sfs";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Local database; in-memory when unset
    pub sqlite_path: Option<PathBuf>,
    pub bus: BusConfig,

    /// Base url of the issuer, e.g. `http://127.0.0.1:7100`
    pub issuer_url: Url,
    /// HMAC key shared with the issuer
    pub jwt_secret: String,
    /// Presented to the issuer on revocation checks and bulk sync
    pub service_key: Option<String>,

    /// How long revocation results and permission lookups are trusted
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    /// Durable consumer names are `{prefix}-identity` and `{prefix}-user`
    pub durable_prefix: String,

    pub log_level: tracing::Level,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, issuer_url: Url, jwt_secret: impl Into<String>) -> Self {
        Self {
            listen_addr,
            sqlite_path: None,
            bus: BusConfig::default(),
            issuer_url,
            jwt_secret: jwt_secret.into(),
            service_key: None,
            cache_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            durable_prefix: DEFAULT_DURABLE_PREFIX.to_string(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }

    pub fn identity_durable_name(&self) -> String {
        format!("{}-identity", self.durable_prefix)
    }

    pub fn user_durable_name(&self) -> String {
        format!("{}-user", self.durable_prefix)
    }
}
