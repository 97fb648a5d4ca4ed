//! Drives one conversion job from pending to a terminal state.
//!
//! pending → processing → completed | failed. The processing transition is
//! persisted before the toolchain starts; every error after that point ends
//! in `failed` with the error's text. Whatever the outcome, the uploaded
//! sources are removed once the job is done.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::db::{JobRegistry, RegistryError};
use crate::models::job::{artifact_file_name, ConversionJob, JobTransition};
use crate::models::task::ConversionTask;
use crate::services::packager::{ArchivePackager, PackagingError, MANIFEST_NAME};
use crate::services::storage::JobStorage;
use crate::services::toolchain::{Toolchain, ToolchainError};

pub struct Orchestrator {
    registry: Arc<dyn JobRegistry>,
    toolchain: Arc<dyn Toolchain>,
    packager: ArchivePackager,
    storage: Arc<JobStorage>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        toolchain: Arc<dyn Toolchain>,
        storage: Arc<JobStorage>,
    ) -> Self {
        Self {
            registry,
            toolchain,
            packager: ArchivePackager::new(),
            storage,
        }
    }

    /// Run the job described by `task` to completion.
    ///
    /// Never fails: errors become a `failed` job. Returns the terminal record,
    /// or `None` if the job was not eligible to run (deleted, or already
    /// picked up) or its final state could not be recorded.
    pub async fn run(&self, task: &ConversionTask) -> Option<ConversionJob> {
        let start = Instant::now();
        tracing::info!(
            job_id = %task.job_id,
            project = %task.project_name,
            "Processing conversion job"
        );

        let outcome = match self
            .registry
            .transition(task.job_id, JobTransition::Processing)
            .await
        {
            Ok(_) => {
                let result = self.convert(task).await;
                self.finish(task, result).await
            }
            Err(e @ (RegistryError::NotFound(_) | RegistryError::InvalidTransition { .. })) => {
                tracing::warn!(job_id = %task.job_id, error = %e, "Skipping job");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %task.job_id, error = %e, "Failed to mark job as processing");
                self.finish(task, Err(e.into())).await
            }
        };

        self.remove_sources(task).await;

        metrics::histogram!("conversion_processing_seconds").record(start.elapsed().as_secs_f64());
        outcome
    }

    /// Mark a job failed after its orchestration died unexpectedly.
    pub async fn recover(&self, task: &ConversionTask, reason: &str) -> Option<ConversionJob> {
        let outcome = self
            .finish(task, Err(OrchestrationError::Internal(reason.to_string())))
            .await;
        self.remove_sources(task).await;
        outcome
    }

    async fn convert(&self, task: &ConversionTask) -> Result<String, OrchestrationError> {
        let output_dir = self.storage.output_dir(task.job_id);
        tokio::fs::create_dir_all(&output_dir).await?;

        let compiled = self.toolchain.compile(&task.source_dir, &output_dir).await?;
        tracing::info!(
            job_id = %task.job_id,
            emitted_dir = %compiled.emitted_dir.display(),
            "Toolchain finished"
        );

        let manifest_path = task.source_dir.join(MANIFEST_NAME);
        let manifest = tokio::fs::try_exists(&manifest_path)
            .await?
            .then_some(manifest_path);

        self.packager
            .package(
                &compiled.emitted_dir,
                &task.project_name,
                manifest.as_deref(),
                &output_dir,
            )
            .await?;

        if compiled.emitted_dir.starts_with(&output_dir) && compiled.emitted_dir != output_dir {
            remove_quietly(task, &compiled.emitted_dir, "compiled output").await;
        }

        Ok(artifact_file_name(&task.project_name))
    }

    async fn finish(
        &self,
        task: &ConversionTask,
        result: Result<String, OrchestrationError>,
    ) -> Option<ConversionJob> {
        let error_message = match result {
            Ok(output_file) => {
                match self
                    .registry
                    .transition(task.job_id, JobTransition::Completed { output_file })
                    .await
                {
                    Ok(job) => {
                        metrics::counter!("conversion_jobs_completed").increment(1);
                        tracing::info!(
                            job_id = %task.job_id,
                            output_file = job.output_file.as_deref().unwrap_or_default(),
                            "Job completed successfully"
                        );
                        return Some(job);
                    }
                    Err(RegistryError::NotFound(_)) => {
                        // Deleted while running; don't leave an orphaned artifact.
                        tracing::warn!(job_id = %task.job_id, "Job deleted during processing");
                        self.discard_output(task).await;
                        return None;
                    }
                    Err(e) => format!("Failed to record completion: {}", e),
                }
            }
            Err(e) => e.to_string(),
        };

        tracing::error!(job_id = %task.job_id, error = %error_message, "Job processing failed");
        self.discard_output(task).await;

        match self
            .registry
            .transition(task.job_id, JobTransition::Failed { error_message })
            .await
        {
            Ok(job) => {
                metrics::counter!("conversion_jobs_failed").increment(1);
                Some(job)
            }
            Err(e) => {
                tracing::error!(job_id = %task.job_id, error = %e, "Failed to record job failure");
                None
            }
        }
    }

    async fn discard_output(&self, task: &ConversionTask) {
        if let Err(e) = self.storage.remove_output(task.job_id).await {
            tracing::warn!(job_id = %task.job_id, error = %e, "Failed to remove job output");
        }
    }

    async fn remove_sources(&self, task: &ConversionTask) {
        remove_quietly(task, &task.source_dir, "uploaded sources").await;
    }
}

async fn remove_quietly(task: &ConversionTask, path: &Path, what: &str) {
    let result = match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    };
    if let Err(e) = result {
        tracing::warn!(
            job_id = %task.job_id,
            path = %path.display(),
            error = %e,
            "Failed to remove {}",
            what
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Conversion error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}
