use std::sync::Arc;

use axum::extract::FromRef;

use common::prelude::TokenValidator;
use service::http::health::{DynDataSource, SqliteSource};
use service::{Clock, DynBus, SystemClock};

use crate::config::{Config, SERVICE_ROOT};
use crate::database::{Database, DatabaseSetupError};
use crate::issuer_client::{IssuerClient, IssuerError};
use crate::permissions::PermissionStore;
use crate::principal::Authenticator;
use crate::revocation::{HttpRevocationSource, RevocationCache, RevocationSource};
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct SfsState {
    database: Database,
    bus: DynBus,
    issuer: IssuerClient,
    permissions: PermissionStore,
    revocation: Arc<RevocationCache>,
    users: UserDirectory,
    authenticator: Authenticator,
}

impl SfsState {
    pub async fn from_config(config: &Config, bus: DynBus) -> Result<Self, StateSetupError> {
        match &config.sqlite_path {
            Some(path) => tracing::info!(path = %path.display(), "opening sfs database"),
            None => tracing::warn!("no sqlite_path configured, using an in-memory sfs database"),
        }
        let database = Database::connect(config.sqlite_path.as_deref()).await?;

        let issuer = IssuerClient::new(&config.issuer_url, config.service_key.as_deref())?;
        let source = Arc::new(HttpRevocationSource::new(issuer.clone()));
        Self::new(database, bus, issuer, source, Arc::new(SystemClock), config)
    }

    pub fn new(
        database: Database,
        bus: DynBus,
        issuer: IssuerClient,
        revocation_source: Arc<dyn RevocationSource>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self, StateSetupError> {
        if config.jwt_secret.is_empty() {
            return Err(StateSetupError::MissingJwtSecret);
        }
        if config.service_key.is_none() {
            tracing::warn!("no service key configured, the issuer will refuse bulk sync");
        }

        let permissions = PermissionStore::with_clock(
            database.clone(),
            SERVICE_ROOT,
            config.cache_ttl,
            clock.clone(),
        );
        let revocation = Arc::new(RevocationCache::with_clock(
            revocation_source,
            config.cache_ttl,
            clock,
        ));
        let authenticator = Authenticator::new(
            TokenValidator::new(config.jwt_secret.as_bytes()),
            revocation.clone(),
            permissions.clone(),
        );

        Ok(Self {
            users: UserDirectory::new(database.clone()),
            database,
            bus,
            issuer,
            permissions,
            revocation,
            authenticator,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn bus(&self) -> &DynBus {
        &self.bus
    }

    pub fn issuer(&self) -> &IssuerClient {
        &self.issuer
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    pub fn revocation(&self) -> &RevocationCache {
        &self.revocation
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }
}

impl FromRef<SfsState> for DynDataSource {
    fn from_ref(state: &SfsState) -> Self {
        Arc::new(SqliteSource::new((*state.database).clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to setup the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("failed to build issuer client: {0}")]
    Issuer(#[from] IssuerError),
    #[error("a jwt secret is required")]
    MissingJwtSecret,
}
