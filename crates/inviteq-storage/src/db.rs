//! Database connection and pool management

use inviteq_common::config::DatabaseConfig;
use inviteq_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database pool wrapper
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect: {}", e)))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// Database trait for type-safe queries
pub trait Database: Send + Sync {
    /// Get the pool
    fn pool(&self) -> &PgPool;
}

impl Database for DatabasePool {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
