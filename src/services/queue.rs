use async_trait::async_trait;
use redis::AsyncCommands;

use crate::models::task::ConversionTask;
use crate::services::executor::{ExecutorError, TaskExecutor};

const QUEUE_KEY: &str = "ts2sh:jobs";
const PROCESSING_KEY: &str = "ts2sh:processing";

/// Redis-backed task queue. The API server enqueues; the `worker` binary
/// dequeues and runs the orchestrator.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a conversion task.
    pub async fn enqueue(&self, task: &ConversionTask) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    /// Dequeue a task, moving it to the processing list until `complete`.
    pub async fn dequeue(&self) -> Result<Option<ConversionTask>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Current number of tasks waiting to be picked up.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    /// Remove a finished task from the processing list.
    pub async fn complete(&self, task: &ConversionTask) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for JobQueue {
    async fn submit(&self, task: ConversionTask) -> Result<(), ExecutorError> {
        self.enqueue(&task).await?;
        if let Ok(depth) = self.queue_depth().await {
            metrics::gauge!("conversion_queue_depth").set(depth as f64);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
