use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{ConversionJob, JobStatus, JobTransition};

pub mod memory;
pub mod queries;

pub use memory::MemoryJobRegistry;
pub use queries::PgJobRegistry;

/// Durable store of conversion job records.
///
/// Implementations apply each write atomically per record. Transitions that
/// the job's current status does not permit are rejected without mutation.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn insert(&self, job: &ConversionJob) -> Result<(), RegistryError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ConversionJob>, RegistryError>;

    /// Jobs ordered by creation time, most recent first.
    async fn list(&self, limit: i64) -> Result<Vec<ConversionJob>, RegistryError>;

    /// Apply a status transition and return the updated record.
    async fn transition(
        &self,
        job_id: Uuid,
        transition: JobTransition,
    ) -> Result<ConversionJob, RegistryError>;

    /// Remove a record. Returns `false` if it did not exist.
    async fn delete(&self, job_id: Uuid) -> Result<bool, RegistryError>;

    async fn health_check(&self) -> Result<(), RegistryError>;

    /// Release connections. Called once on shutdown.
    async fn close(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Open the configured registry: PostgreSQL (migrated) when a URL is given,
/// otherwise an in-memory store.
pub async fn open_registry(database_url: Option<&str>) -> Result<Arc<dyn JobRegistry>, sqlx::Error> {
    match database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = init_pool(url).await?;
            tracing::info!("Running database migrations");
            run_migrations(&pool).await?;
            Ok(Arc::new(PgJobRegistry::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, job records are kept in memory");
            Ok(Arc::new(MemoryJobRegistry::new()))
        }
    }
}
