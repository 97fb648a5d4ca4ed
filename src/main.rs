use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ts2sh::{
    app_state::AppState,
    config::AppConfig,
    db,
    routes::{self, metrics::MetricsState},
    services::{
        conversion::ConversionService,
        executor::{SpawnExecutor, TaskExecutor},
        orchestrator::Orchestrator,
        queue::JobQueue,
        storage::JobStorage,
        toolchain::TypeScriptToolchain,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ts2sh server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_histogram!(
        "conversion_processing_seconds",
        "Time to compile and package one conversion job"
    );
    metrics::describe_counter!("conversion_jobs_total", "Total conversion jobs submitted");
    metrics::describe_counter!(
        "conversion_jobs_completed",
        "Total conversion jobs completed"
    );
    metrics::describe_counter!(
        "conversion_jobs_failed",
        "Total conversion jobs that failed"
    );
    metrics::describe_gauge!(
        "conversion_queue_depth",
        "Current number of queued jobs waiting for a worker"
    );

    let registry = db::open_registry(config.database_url.as_deref())
        .await
        .expect("Failed to open job registry");

    let storage = Arc::new(JobStorage::new(&config.upload_dir, &config.output_dir));
    storage
        .init()
        .await
        .expect("Failed to create upload and output directories");

    // Either hand jobs to the worker through Redis or run them in-process.
    let (executor, queue, pool) = match &config.redis_url {
        Some(redis_url) => {
            tracing::info!("Connecting to Redis job queue");
            let queue = Arc::new(JobQueue::new(redis_url).expect("Failed to initialize job queue"));
            (queue.clone() as Arc<dyn TaskExecutor>, Some(queue), None)
        }
        None => {
            tracing::info!(
                max_concurrent_jobs = config.max_concurrent_jobs,
                "Starting in-process conversion workers"
            );
            let toolchain = TypeScriptToolchain::new(&config.tsc_bin, &config.npm_bin)
                .with_timeout(config.toolchain_timeout());
            let orchestrator = Arc::new(Orchestrator::new(
                registry.clone(),
                Arc::new(toolchain),
                storage.clone(),
            ));
            let pool = Arc::new(SpawnExecutor::new(orchestrator, config.max_concurrent_jobs));
            (pool.clone() as Arc<dyn TaskExecutor>, None, Some(pool))
        }
    };

    let conversions =
        ConversionService::new(registry.clone(), storage, executor, config.job_list_limit);
    let state = AppState::new(registry.clone(), conversions, queue.clone());

    let cors = match config.cors_origin_list() {
        None => CorsLayer::permissive(),
        Some(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(
                origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()),
            ))
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let metrics_state = MetricsState {
        handle: prometheus_handle,
        queue,
    };

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting ts2sh on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    if let Some(pool) = pool {
        tracing::info!("Waiting for running conversions to finish");
        pool.drain().await;
    }
    registry.close().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
