use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;

pub use service::database::DatabaseSetupError;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    /// Open (or create) the sfs database and bring its schema up to date.
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
