use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use http::request::Parts;
use sqlx::SqlitePool;
use tokio::sync::watch;

#[async_trait]
pub trait DataSource {
    /// Perform various checks on the system to ensure its healthy and ready to accept requests.
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("one or more dependent services aren't available")]
    DependencyFailure,

    #[error("service has received signal indicating it should shutdown")]
    ShuttingDown,
}

pub type DynDataSource = Arc<dyn DataSource + Send + Sync>;

pub struct StateDataSource(DynDataSource);

impl Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataSource").finish()
    }
}

impl StateDataSource {
    pub fn new(dds: DynDataSource) -> Self {
        Self(dds)
    }
}

impl Deref for StateDataSource {
    type Target = DynDataSource;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ready while the database answers and no shutdown has been signalled.
pub struct SqliteSource {
    pool: SqlitePool,
    shutdown: Option<watch::Receiver<()>>,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        if let Some(shutdown) = &self.shutdown {
            if shutdown.has_changed().unwrap_or(true) {
                return Err(DataSourceError::ShuttingDown);
            }
        }

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|_| DataSourceError::DependencyFailure)?;
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StateDataSource
where
    DynDataSource: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ();

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource(DynDataSource::from_ref(state)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Clone)]
    pub(crate) enum MockReadiness {
        DependencyFailure,
        Ready,
        ShuttingDown,
    }

    #[async_trait]
    impl DataSource for MockReadiness {
        async fn is_ready(&self) -> Result<(), DataSourceError> {
            use MockReadiness::*;

            match self {
                DependencyFailure => Err(DataSourceError::DependencyFailure),
                Ready => Ok(()),
                ShuttingDown => Err(DataSourceError::ShuttingDown),
            }
        }
    }

    #[tokio::test]
    async fn test_sqlite_source_reports_shutdown() {
        let pool = crate::database::connect_sqlite(None).await.unwrap();
        let (tx, rx) = watch::channel(());
        let source = SqliteSource::new(pool).with_shutdown(rx);
        assert!(source.is_ready().await.is_ok());

        tx.send(()).unwrap();
        assert!(matches!(
            source.is_ready().await,
            Err(DataSourceError::ShuttingDown)
        ));
    }
}
