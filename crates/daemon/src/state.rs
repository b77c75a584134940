use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, str::FromStr};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use url::Url;

use service::BusConfig;

pub const APP_NAME: &str = "ecloud";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const AUTH_DB_FILE_NAME: &str = "auth.sqlite";
pub const SFS_DB_FILE_NAME: &str = "sfs.sqlite";
pub const BUS_FILE_NAME: &str = "bus.sqlite";
pub const LOGS_DIR_NAME: &str = "logs";

pub const JWT_SECRET_ENV: &str = "ECLOUD_JWT_SECRET";
pub const SERVICE_KEY_ENV: &str = "ECLOUD_SERVICE_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HMAC key shared by the issuer and every consuming service
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Key consuming services present to the issuer
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub sfs: SfsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_auth_port")]
    pub port: u16,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfsSection {
    #[serde(default = "default_sfs_port")]
    pub port: u16,
    /// Where to reach the issuer; the local issuer port when unset
    #[serde(default)]
    pub issuer_url: Option<Url>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auth_port() -> u16 {
    7100
}

fn default_sfs_port() -> u16 {
    7200
}

fn default_session_ttl_secs() -> u64 {
    auth::config::DEFAULT_SESSION_TTL.as_secs()
}

fn default_cache_ttl_secs() -> u64 {
    service::cache::DEFAULT_TTL.as_secs()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            port: default_auth_port(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for SfsSection {
    fn default() -> Self {
        Self {
            port: default_sfs_port(),
            issuer_url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            service_key: None,
            log_level: default_log_level(),
            bus: BusConfig::default(),
            auth: AuthSection::default(),
            sfs: SfsSection::default(),
        }
    }
}

impl AppConfig {
    /// Take secrets from the environment where set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(JWT_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.jwt_secret = Some(secret);
        }
        if let Some(key) = lookup(SERVICE_KEY_ENV).filter(|s| !s.is_empty()) {
            self.service_key = Some(key);
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn issuer_url(&self) -> Result<Url, StateError> {
        match &self.sfs.issuer_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("http://127.0.0.1:{}", self.auth.port))
                .map_err(|e| StateError::InvalidIssuerUrl(e.to_string())),
        }
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ecloud directory (~/.ecloud)
    pub ecloud_dir: PathBuf,
    pub config_path: PathBuf,
    pub auth_db_path: PathBuf,
    pub sfs_db_path: PathBuf,
    pub logs_path: PathBuf,
    /// Loaded configuration, environment overrides applied
    pub config: AppConfig,
}

impl AppState {
    /// Get the ecloud directory path (custom or default ~/.ecloud)
    pub fn ecloud_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Create the directory and write a config with freshly generated
    /// secrets and a durable bus next to the databases.
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let ecloud_dir = Self::ecloud_dir(custom_path)?;
        if ecloud_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&ecloud_dir)?;

        let mut config = config.unwrap_or_default();
        if config.jwt_secret.is_none() {
            config.jwt_secret = Some(generate_secret());
        }
        if config.service_key.is_none() {
            config.service_key = Some(generate_secret());
        }
        if config.bus == BusConfig::Memory {
            config.bus = BusConfig::Sqlite {
                path: ecloud_dir.join(BUS_FILE_NAME),
            };
        }

        let state = Self::paths(ecloud_dir, config);
        fs::create_dir_all(&state.logs_path)?;
        fs::write(&state.config_path, toml::to_string_pretty(&state.config)?)?;
        Ok(state)
    }

    /// Load existing state, then apply environment overrides.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        Self::load_with_env(custom_path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        custom_path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StateError> {
        let ecloud_dir = Self::ecloud_dir(custom_path)?;
        if !ecloud_dir.exists() {
            return Err(StateError::NotInitialized);
        }
        let config_path = ecloud_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let mut config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.apply_env(lookup);
        Ok(Self::paths(ecloud_dir, config))
    }

    fn paths(ecloud_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            config_path: ecloud_dir.join(CONFIG_FILE_NAME),
            auth_db_path: ecloud_dir.join(AUTH_DB_FILE_NAME),
            sfs_db_path: ecloud_dir.join(SFS_DB_FILE_NAME),
            logs_path: ecloud_dir.join(LOGS_DIR_NAME),
            ecloud_dir,
            config,
        }
    }

    fn jwt_secret(&self) -> Result<String, StateError> {
        self.config
            .jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(StateError::MissingJwtSecret)
    }

    pub fn auth_config(
        &self,
        port: Option<u16>,
        log_dir: Option<PathBuf>,
    ) -> Result<auth::Config, StateError> {
        let listen_addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(self.config.auth.port)));
        let mut config = auth::Config::new(listen_addr, self.jwt_secret()?);
        config.sqlite_path = Some(self.auth_db_path.clone());
        config.bus = self.config.bus.clone();
        config.service_key = self.config.service_key.clone();
        config.session_ttl = Duration::from_secs(self.config.auth.session_ttl_secs);
        config.log_level = self.config.log_level()?;
        config.log_dir = log_dir;
        Ok(config)
    }

    pub fn sfs_config(
        &self,
        port: Option<u16>,
        log_dir: Option<PathBuf>,
    ) -> Result<sfs::Config, StateError> {
        let listen_addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(self.config.sfs.port)));
        let mut config = sfs::Config::new(listen_addr, self.config.issuer_url()?, self.jwt_secret()?);
        config.sqlite_path = Some(self.sfs_db_path.clone());
        config.bus = self.config.bus.clone();
        config.service_key = self.config.service_key.clone();
        config.cache_ttl = Duration::from_secs(self.config.sfs.cache_ttl_secs);
        config.log_level = self.config.log_level()?;
        config.log_dir = log_dir;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("ecloud directory not initialized. Run 'ecloud init' first")]
    NotInitialized,

    #[error("ecloud directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("no jwt secret configured (set jwt_secret or ECLOUD_JWT_SECRET)")]
    MissingJwtSecret,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid issuer url: {0}")]
    InvalidIssuerUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_generates_secrets_and_durable_bus() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ecloud");

        let state = AppState::init(Some(root.clone()), None).unwrap();
        assert!(state.config_path.exists());
        assert!(state.logs_path.is_dir());
        assert_eq!(state.config.jwt_secret.as_ref().map(String::len), Some(64));
        assert_ne!(state.config.jwt_secret, state.config.service_key);
        assert_eq!(
            state.config.bus,
            BusConfig::Sqlite {
                path: root.join(BUS_FILE_NAME)
            }
        );

        let loaded = AppState::load_with_env(Some(root), |_| None).unwrap();
        assert_eq!(loaded.config, state.config);
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ecloud");
        AppState::init(Some(root.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(root), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load_with_env(Some(dir.path().join("missing")), |_| None),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ecloud");
        AppState::init(Some(root.clone()), None).unwrap();

        let state = AppState::load_with_env(Some(root), |key| match key {
            JWT_SECRET_ENV => Some("from-env".to_string()),
            SERVICE_KEY_ENV => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(state.config.jwt_secret.as_deref(), Some("from-env"));
        // empty values are ignored
        assert!(state.config.service_key.is_some());
    }

    #[test]
    fn test_service_configs_follow_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.auth.port = 8100;
        config.sfs.cache_ttl_secs = 10;
        let state = AppState::init(Some(dir.path().join("ecloud")), Some(config)).unwrap();

        let auth = state.auth_config(None, None).unwrap();
        assert_eq!(auth.listen_addr.port(), 8100);
        assert_eq!(auth.sqlite_path.as_deref(), Some(state.auth_db_path.as_path()));

        let sfs = state.sfs_config(Some(9000), None).unwrap();
        assert_eq!(sfs.listen_addr.port(), 9000);
        assert_eq!(sfs.issuer_url.as_str(), "http://127.0.0.1:8100/");
        assert_eq!(sfs.cache_ttl, Duration::from_secs(10));
        assert_eq!(sfs.service_key, state.config.service_key);
    }

    #[test]
    fn test_missing_secret_and_bad_level() {
        let config = AppConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.log_level(), Err(StateError::InvalidLogLevel(_))));

        let state = AppState::paths(PathBuf::from("/tmp/ecloud"), AppConfig::default());
        assert!(matches!(
            state.auth_config(None, None),
            Err(StateError::MissingJwtSecret)
        ));
    }

    #[test]
    fn test_config_file_defaults() {
        let config: AppConfig = toml::from_str("jwt_secret = \"s\"\n").unwrap();
        assert_eq!(config.auth.port, 7100);
        assert_eq!(config.sfs.port, 7200);
        assert_eq!(config.bus, BusConfig::Memory);
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
    }
}
