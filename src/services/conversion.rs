use garde::Validate;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{JobRegistry, RegistryError};
use crate::models::conversion::{ConversionRequest, ConversionStatus};
use crate::models::job::{ConversionJob, JobStatus, JobTransition};
use crate::models::task::ConversionTask;
use crate::services::executor::{ExecutorError, TaskExecutor};
use crate::services::storage::{JobStorage, StorageError, UploadedFile};

/// A packaged artifact ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Submission and query operations over the job registry and job storage.
pub struct ConversionService {
    registry: Arc<dyn JobRegistry>,
    storage: Arc<JobStorage>,
    executor: Arc<dyn TaskExecutor>,
    list_limit: i64,
}

impl ConversionService {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        storage: Arc<JobStorage>,
        executor: Arc<dyn TaskExecutor>,
        list_limit: i64,
    ) -> Self {
        Self {
            registry,
            storage,
            executor,
            list_limit,
        }
    }

    /// Store the uploaded project, record a pending job and schedule its
    /// conversion. Returns the job as recorded at submission time.
    pub async fn submit(
        &self,
        project_name: String,
        files: Vec<UploadedFile>,
    ) -> Result<ConversionJob, ConversionError> {
        let request = ConversionRequest { project_name };
        request
            .validate()
            .map_err(|e| ConversionError::InvalidInput(e.to_string()))?;
        if files.is_empty() {
            return Err(ConversionError::InvalidInput("No files uploaded".to_string()));
        }

        let job = ConversionJob::new(request.project_name);

        let source_dir = match self.storage.save_upload(job.id, &files).await {
            Ok(dir) => dir,
            Err(e) => {
                self.drop_upload(job.id).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.registry.insert(&job).await {
            self.drop_upload(job.id).await;
            return Err(e.into());
        }

        metrics::counter!("conversion_jobs_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            project = %job.project_name,
            file_count = files.len(),
            "Conversion job submitted"
        );

        let task = ConversionTask {
            job_id: job.id,
            source_dir,
            project_name: job.project_name.clone(),
        };

        if let Err(e) = self.executor.submit(task).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to schedule conversion");
            let failure = JobTransition::Failed {
                error_message: format!("Failed to schedule conversion: {}", e),
            };
            if let Err(re) = self.registry.transition(job.id, failure).await {
                tracing::error!(job_id = %job.id, error = %re, "Failed to record job failure");
            }
            self.drop_upload(job.id).await;
            return Err(e.into());
        }

        Ok(job)
    }

    pub async fn job(&self, job_id: Uuid) -> Result<ConversionJob, ConversionError> {
        self.registry
            .get(job_id)
            .await?
            .ok_or(ConversionError::NotFound(job_id))
    }

    pub async fn status(&self, job_id: Uuid) -> Result<ConversionStatus, ConversionError> {
        let job = self.job(job_id).await?;
        Ok(ConversionStatus::from(&job))
    }

    /// All jobs, most recent first.
    pub async fn list(&self) -> Result<Vec<ConversionJob>, ConversionError> {
        Ok(self.registry.list(self.list_limit).await?)
    }

    pub async fn download(&self, job_id: Uuid) -> Result<Artifact, ConversionError> {
        let job = self.job(job_id).await?;
        let file_name = match (job.status, job.output_file) {
            (JobStatus::Completed, Some(name)) => name,
            _ => return Err(ConversionError::NotCompleted(job_id)),
        };

        match self.storage.read_artifact(job_id, &file_name).await? {
            Some(bytes) => Ok(Artifact { file_name, bytes }),
            None => Err(ConversionError::ArtifactMissing(job_id)),
        }
    }

    /// Remove a job's record and its output. Running work is not interrupted.
    pub async fn delete(&self, job_id: Uuid) -> Result<(), ConversionError> {
        self.job(job_id).await?;
        self.storage.remove_output(job_id).await?;
        if !self.registry.delete(job_id).await? {
            return Err(ConversionError::NotFound(job_id));
        }
        tracing::info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    async fn drop_upload(&self, job_id: Uuid) {
        if let Err(e) = self.storage.remove_upload(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove uploaded files");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Job not found")]
    NotFound(Uuid),

    #[error("Job not completed yet")]
    NotCompleted(Uuid),

    #[error("Output file not found")]
    ArtifactMissing(Uuid),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl From<StorageError> for ConversionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(_) => ConversionError::InvalidInput(e.to_string()),
            other => ConversionError::Storage(other),
        }
    }
}
