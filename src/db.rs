//! Pooled SQLite handle shared by the job queue and the candidate store.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// SQLite serializes writers, so a handful of connections is plenty.
const POOL_SIZE: u32 = 4;

/// How long a connection waits on a locked database before erroring.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors opening or migrating the database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Open(#[from] sqlx::Error),

    /// Schema migrations could not be applied.
    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Cheaply clonable database handle; every clone shares one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database at `path`, creating and migrating it as needed.
    ///
    /// WAL journaling is enabled so job-status polling never queues behind
    /// worker writes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the open or a migration fails.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;

        Self::migrate(pool).await
    }

    /// Opens a private in-memory database. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the open or a migration fails.
    #[instrument]
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for executing queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drains the pool. Call once at shutdown; the handle (and all clones)
    /// must not be used afterwards.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
