//! Database management and migrations
//!
//! Provides the SQLite connection and embedded schema migrations for the
//! job, candidate and batch payload tables in ~/.scout/scout.db

use crate::error::{Result, ScoutError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Database connection wrapper
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) pool: Arc<DatabasePool>,
}

impl Database {
    /// Open (creating if needed) the SQLite file at `database_path`
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::with_max_connections(database_path, 5).await
    }

    /// Open the database with a custom pool size
    pub async fn with_max_connections<P: AsRef<Path>>(
        database_path: P,
        max_connections: u32,
    ) -> Result<Self> {
        let path = database_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScoutError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        debug!(path = %path.display(), "Connecting to database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| ScoutError::Database(format!("Failed to connect to database: {}", e)))?;

        info!(path = %path.display(), "Database connection established");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Run the embedded migrations in ./migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| ScoutError::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| ScoutError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Open the database and bring the schema up to date
    pub async fn initialize<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let db = Self::new(database_path).await?;
        db.run_migrations().await?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_in_memory_database() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let db = Database {
            pool: Arc::new(pool),
        };

        assert!(db.health_check().await.is_ok());
        db.close().await;
    }

    #[tokio::test]
    async fn test_initialize_creates_parent_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("scout.db");

        let db = Database::initialize(&path).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["batch_payloads", "candidates", "sourcing_jobs"]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::initialize(temp_dir.path().join("scout.db")).await.unwrap();
        assert!(db.run_migrations().await.is_ok());
    }
}
