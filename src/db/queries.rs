use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::{JobRegistry, RegistryError};
use crate::models::job::{ConversionJob, JobStatus, JobTransition};

const JOB_COLUMNS: &str =
    "id, project_name, status, created_at, updated_at, error_message, output_file";

/// PostgreSQL-backed job registry.
#[derive(Clone)]
pub struct PgJobRegistry {
    pool: PgPool,
}

impl PgJobRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: &PgRow) -> Result<ConversionJob, RegistryError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| RegistryError::Corrupt(format!("unknown status '{}'", status_str)))?;

    Ok(ConversionJob {
        id: row.try_get("id")?,
        project_name: row.try_get("project_name")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        error_message: row.try_get("error_message")?,
        output_file: row.try_get("output_file")?,
    })
}

#[async_trait]
impl JobRegistry for PgJobRegistry {
    async fn insert(&self, job: &ConversionJob) -> Result<(), RegistryError> {
        sqlx::query(
            r#"
            INSERT INTO conversion_jobs
                (id, project_name, status, created_at, updated_at, error_message, output_file)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(&job.project_name)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(&job.error_message)
        .bind(&job.output_file)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ConversionJob>, RegistryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversion_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(&self, limit: i64) -> Result<Vec<ConversionJob>, RegistryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversion_jobs ORDER BY created_at DESC LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn transition(
        &self,
        job_id: Uuid,
        transition: JobTransition,
    ) -> Result<ConversionJob, RegistryError> {
        let target = transition.target();
        let allowed: Vec<String> = target
            .allowed_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let (output_file, error_message) = match &transition {
            JobTransition::Processing => (None, None),
            JobTransition::Completed { output_file } => (Some(output_file.as_str()), None),
            JobTransition::Failed { error_message } => (None, Some(error_message.as_str())),
        };

        // Guarded single-statement update: the status check and the write
        // happen atomically.
        let row = sqlx::query(&format!(
            r#"
            UPDATE conversion_jobs
            SET status = $2,
                output_file = $3,
                error_message = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(target.as_str())
        .bind(output_file)
        .bind(error_message)
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => row_to_job(&r),
            None => match self.get(job_id).await? {
                Some(current) => Err(RegistryError::InvalidTransition {
                    job_id,
                    from: current.status,
                    to: target,
                }),
                None => Err(RegistryError::NotFound(job_id)),
            },
        }
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM conversion_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
