use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{JobRegistry, RegistryError};
use crate::models::job::{ConversionJob, JobTransition};

/// In-process job registry. Used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<Uuid, ConversionJob>>,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for MemoryJobRegistry {
    async fn insert(&self, job: &ConversionJob) -> Result<(), RegistryError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ConversionJob>, RegistryError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list(&self, limit: i64) -> Result<Vec<ConversionJob>, RegistryError> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<ConversionJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(all)
    }

    async fn transition(
        &self,
        job_id: Uuid,
        transition: JobTransition,
    ) -> Result<ConversionJob, RegistryError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::NotFound(job_id))?;

        let from = job.status;
        if !job.apply(&transition) {
            return Err(RegistryError::InvalidTransition {
                job_id,
                from,
                to: transition.target(),
            });
        }
        Ok(job.clone())
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool, RegistryError> {
        Ok(self.jobs.write().await.remove(&job_id).is_some())
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let registry = MemoryJobRegistry::new();
        let mut older = ConversionJob::new("older");
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = ConversionJob::new("newer");

        registry.insert(&older).await.unwrap();
        registry.insert(&newer).await.unwrap();

        let jobs = registry.list(100).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].project_name, "newer");
        assert_eq!(jobs[1].project_name, "older");

        assert_eq!(registry.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_record_untouched() {
        let registry = MemoryJobRegistry::new();
        let job = ConversionJob::new("demo");
        registry.insert(&job).await.unwrap();

        let err = registry
            .transition(
                job.id,
                JobTransition::Completed {
                    output_file: "demo.sh".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            }
        ));

        let stored = registry.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn test_transition_on_missing_job() {
        let registry = MemoryJobRegistry::new();
        let err = registry
            .transition(Uuid::new_v4(), JobTransition::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let registry = MemoryJobRegistry::new();
        let job = ConversionJob::new("demo");
        registry.insert(&job).await.unwrap();

        assert!(registry.delete(job.id).await.unwrap());
        assert!(!registry.delete(job.id).await.unwrap());
        assert!(registry.get(job.id).await.unwrap().is_none());
    }
}
