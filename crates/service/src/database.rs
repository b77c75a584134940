//! SQLite connection setup shared by every service that keeps local state.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FILE_CONNECTIONS: u32 = 5;

/// Open a pool for the database at `path`, or a private in-memory database
/// when `path` is `None`.
///
/// Parent directories are created as needed. File databases run in WAL mode.
pub async fn connect_sqlite(path: Option<&Path>) -> Result<SqlitePool, DatabaseSetupError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(DatabaseSetupError::Directory)?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(BUSY_TIMEOUT);

            SqlitePoolOptions::new()
                .max_connections(MAX_FILE_CONNECTIONS)
                .connect_with(options)
                .await
                .map_err(DatabaseSetupError::Unavailable)
        }
        None => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(DatabaseSetupError::Unavailable)?
                .foreign_keys(true);

            // every connection to :memory: is its own database, so the pool
            // must hold exactly one and never recycle it
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(DatabaseSetupError::Unavailable)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("unable to create database directory: {0}")]
    Directory(std::io::Error),
}
