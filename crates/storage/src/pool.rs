//! Process-wide connection handle shared by every table store.

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::info;

use crawlq_core::config::DatabaseConfig;

use crate::error::StorageError;
use crate::schema::Dialect;

/// A connection pool plus the dialect its URL selects.
///
/// Cheap to clone; table stores borrow the pool, they never own it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
}

impl Database {
    /// Connect using a [`DatabaseConfig`].
    ///
    /// In-memory SQLite lives and dies with its connection, so such pools are
    /// pinned to a single connection that is never recycled.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let dialect = Dialect::from_url(&config.url)?;
        install_default_drivers();

        let in_memory = dialect == Dialect::Sqlite && config.url.contains(":memory:");
        let options = if in_memory {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = options.connect(&config.url).await?;
        info!(url = %config.redacted_url(), ?dialect, "Database connected");
        Ok(Self { pool, dialect })
    }

    /// Shorthand for [`Database::connect`] with default pool settings.
    pub async fn connect_url(url: &str) -> Result<Self, StorageError> {
        Self::connect(&DatabaseConfig::new(url)).await
    }

    /// Private in-memory SQLite database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect_url("sqlite::memory:").await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
