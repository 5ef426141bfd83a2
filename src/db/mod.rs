use crate::config::DatabaseConfig;
use crate::error::Error;
use anyhow::Result;
use self::repositories::{DetectionsRepository, InMemoryDetectionStore, ResultStore};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod migrations;
pub mod models;
pub mod repositories;

/// Database service for handling connections and migrations
pub struct DatabaseService {
    pub pool: Arc<PgPool>,
}

impl DatabaseService {
    /// Create a new database service
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing Database service");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to PostgreSQL database");

        let service = Self {
            pool: Arc::new(pool),
        };

        if config.auto_migrate {
            service.run_migrations().await?;
        }

        Ok(service)
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        info!("Database migrations completed successfully");

        Ok(())
    }

    pub fn detections(&self) -> DetectionsRepository {
        DetectionsRepository::new(Arc::clone(&self.pool))
    }
}

/// Build the result store selected by configuration
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn ResultStore>> {
    if config.in_memory {
        warn!("Using in-memory detection store; history is lost on restart");
        return Ok(Arc::new(InMemoryDetectionStore::new()));
    }

    let service = DatabaseService::new(config).await?;
    Ok(Arc::new(service.detections()))
}
