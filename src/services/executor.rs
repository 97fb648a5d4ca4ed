use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::models::task::ConversionTask;
use crate::services::orchestrator::Orchestrator;
use crate::services::queue::QueueError;

/// Runs conversion tasks independently of the request that submitted them.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Hand off a task. Returns once the task is scheduled, not when it is done
    /// (except for [`InlineExecutor`]).
    async fn submit(&self, task: ConversionTask) -> Result<(), ExecutorError>;
}

/// In-process worker pool: one tokio task per job, at most `max_concurrent`
/// running orchestrations at a time.
pub struct SpawnExecutor {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    /// Every accepted task, from `submit` until its job is terminal.
    tasks: TaskTracker,
}

impl SpawnExecutor {
    /// # Panics
    /// Panics if `max_concurrent` is 0; `AppConfig::validate` rejects that.
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: u32) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
            tasks: TaskTracker::new(),
        }
    }

    /// Refuse new work, then wait for every accepted task (running or still
    /// waiting for a permit) to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.permits.close();
        tracing::info!("Conversion worker pool drained");
    }
}

#[async_trait]
impl TaskExecutor for SpawnExecutor {
    async fn submit(&self, task: ConversionTask) -> Result<(), ExecutorError> {
        if self.tasks.is_closed() {
            return Err(ExecutorError::Closed);
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);

        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(job_id = %task.job_id, "Worker pool closed before job started");
                orchestrator
                    .recover(&task, "Conversion cancelled during shutdown")
                    .await;
                return;
            };

            // Run in a separate task so a panic surfaces as a JoinError here
            // instead of silently leaving the job in `processing`.
            let worker = {
                let orchestrator = Arc::clone(&orchestrator);
                let task = task.clone();
                tokio::spawn(async move {
                    orchestrator.run(&task).await;
                })
            };

            if let Err(e) = worker.await {
                tracing::error!(job_id = %task.job_id, error = %e, "Conversion task aborted");
                orchestrator
                    .recover(&task, "Internal error during conversion")
                    .await;
            }
        });

        Ok(())
    }
}

/// Runs the orchestration to completion inside `submit`. Makes background
/// work deterministic in tests.
pub struct InlineExecutor {
    orchestrator: Arc<Orchestrator>,
}

impl InlineExecutor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl TaskExecutor for InlineExecutor {
    async fn submit(&self, task: ConversionTask) -> Result<(), ExecutorError> {
        self.orchestrator.run(&task).await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor is shut down")]
    Closed,

    #[error(transparent)]
    Queue(#[from] QueueError),
}
