use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{CourseCacheRepository, Storage};

mod course_repo;
mod mapping;
mod migrate;

/// Per-connection settings. The player writes the cache while the dashboard
/// reads it, so readers must not block the writer.
const CONNECTION_PRAGMAS: &[&str] = &["PRAGMA journal_mode = WAL;", "PRAGMA busy_timeout = 5000;"];

/// Course cache stored in a `SQLite` database.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error("cannot open course cache database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("course cache migration failed: {0}")]
    Migrate(#[source] sqlx::Error),
}

impl SqliteRepository {
    /// Opens the cache database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::Connect` if the database cannot be opened or
    /// a connection pragma is rejected.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    for pragma in CONNECTION_PRAGMAS {
                        sqlx::query(*pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(SqliteInitError::Connect)?;
        Ok(Self { pool })
    }

    /// Brings the `course_cache` schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::Migrate` if a migration step fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool)
            .await
            .map_err(SqliteInitError::Migrate)
    }
}

impl Storage {
    /// Opens and migrates a `SQLite` course cache.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or migrated.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let courses: Arc<dyn CourseCacheRepository> = Arc::new(repo);
        Ok(Self { courses })
    }
}
