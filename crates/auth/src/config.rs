use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use service::BusConfig;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_EVENT_SOURCE: &str = "auth";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Local database; in-memory when unset
    pub sqlite_path: Option<PathBuf>,
    pub bus: BusConfig,

    /// HMAC key shared with every consuming service
    pub jwt_secret: String,
    /// Shared key consuming services present on the revocation and bulk sync
    /// endpoints. Bulk sync is refused entirely when unset.
    pub service_key: Option<String>,
    pub session_ttl: Duration,
    /// `source` stamped on user lifecycle events
    pub event_source: String,

    pub log_level: tracing::Level,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, jwt_secret: impl Into<String>) -> Self {
        Self {
            listen_addr,
            sqlite_path: None,
            bus: BusConfig::default(),
            jwt_secret: jwt_secret.into(),
            service_key: None,
            session_ttl: DEFAULT_SESSION_TTL,
            event_source: DEFAULT_EVENT_SOURCE.to_string(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
