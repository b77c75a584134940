pub mod models;

use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;

pub use service::database::DatabaseSetupError;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    /// Open (or create) the issuer database and bring its schema up to date.
    /// `None` opens a private in-memory database.
    pub async fn connect(path: Option<&Path>) -> Result<Self, DatabaseSetupError> {
        let pool = service::database::connect_sqlite(path).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Database::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Whether `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}
