use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use common::prelude::{TokenSigner, TokenValidator};
use service::http::health::{DynDataSource, SqliteSource};
use service::DynBus;

use crate::config::Config;
use crate::database::{Database, DatabaseSetupError};
use crate::publisher::EventPublisher;

/// Everything a request handler in the issuer needs.
#[derive(Clone)]
pub struct AuthState {
    database: Database,
    signer: TokenSigner,
    validator: TokenValidator,
    publisher: EventPublisher,
    service_key: Option<Arc<str>>,
    session_ttl: Duration,
}

impl AuthState {
    pub async fn from_config(config: &Config, bus: DynBus) -> Result<Self, StateSetupError> {
        // 1. Setup database
        match &config.sqlite_path {
            Some(path) => tracing::info!(path = %path.display(), "opening issuer database"),
            None => tracing::warn!("no sqlite_path configured, using an in-memory issuer database"),
        }
        let database = Database::connect(config.sqlite_path.as_deref()).await?;

        // 2. Everything else is derived from config
        Self::new(database, bus, config)
    }

    pub fn new(database: Database, bus: DynBus, config: &Config) -> Result<Self, StateSetupError> {
        if config.jwt_secret.is_empty() {
            return Err(StateSetupError::MissingJwtSecret);
        }
        if config.service_key.is_none() {
            tracing::warn!("no service key configured, bulk sync is disabled and token checks are open");
        }

        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            database,
            signer: TokenSigner::new(secret),
            validator: TokenValidator::new(secret),
            publisher: EventPublisher::new(bus, config.event_source.clone()),
            service_key: config.service_key.as_deref().map(Arc::from),
            session_ttl: config.session_ttl,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn service_key(&self) -> Option<&str> {
        self.service_key.as_deref()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

impl FromRef<AuthState> for DynDataSource {
    fn from_ref(state: &AuthState) -> Self {
        Arc::new(SqliteSource::new((*state.database).clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to setup the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("a jwt secret is required")]
    MissingJwtSecret,
}
