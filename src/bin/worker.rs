use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use ts2sh::{
    config::AppConfig,
    db,
    services::{
        orchestrator::Orchestrator, queue::JobQueue, storage::JobStorage,
        toolchain::TypeScriptToolchain,
    },
};

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting conversion worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let redis_url = config
        .redis_url
        .as_deref()
        .expect("REDIS_URL must be set for the worker");

    let registry = db::open_registry(config.database_url.as_deref())
        .await
        .expect("Failed to open job registry");

    // Uploads and outputs must be shared with the API server
    let storage = Arc::new(JobStorage::new(&config.upload_dir, &config.output_dir));
    storage
        .init()
        .await
        .expect("Failed to create upload and output directories");

    let toolchain = TypeScriptToolchain::new(&config.tsc_bin, &config.npm_bin)
        .with_timeout(config.toolchain_timeout());
    let orchestrator = Arc::new(Orchestrator::new(registry, Arc::new(toolchain), storage));

    let queue = JobQueue::new(redis_url).expect("Failed to initialize job queue");

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&queue, &orchestrator).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queue error, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was taken, Ok(false) if the queue was empty.
async fn process_next_job(
    queue: &JobQueue,
    orchestrator: &Arc<Orchestrator>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let task = match queue.dequeue().await? {
        Some(t) => t,
        None => return Ok(false),
    };

    tracing::info!(
        job_id = %task.job_id,
        project_name = %task.project_name,
        "Processing conversion job"
    );

    // Failures are recorded on the job itself; conversions are not retried.
    let worker = {
        let orchestrator = Arc::clone(orchestrator);
        let task = task.clone();
        tokio::spawn(async move { orchestrator.run(&task).await })
    };
    let job = match worker.await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(job_id = %task.job_id, error = %e, "Conversion task aborted");
            orchestrator
                .recover(&task, "Internal error during conversion")
                .await
        }
    };
    queue.complete(&task).await?;

    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("conversion_queue_depth").set(depth as f64);
    }

    if let Some(job) = job {
        tracing::info!(job_id = %job.id, status = %job.status, "Job finished");
    }

    Ok(true)
}
