use card_faceswap::{
    app_state::build_job_store,
    config::AppConfig,
    services::{
        faceswap::{GradioFaceSwapClient, GENERIC_FAILURE_MESSAGE},
        generation::{record_failure, GenerationRunner},
        queue::JobQueue,
        store::JobStore,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

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

    tracing::info!("Starting face swap worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    config
        .validate_deployment()
        .expect("Invalid deployment configuration");

    // Workers keep their own in-process metrics; nothing scrapes them yet.
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    card_faceswap::routes::metrics::describe_metrics();

    let store = build_job_store(&config)
        .await
        .expect("Failed to initialize job store");

    let redis_url = config
        .redis_url
        .as_deref()
        .expect("REDIS_URL must be set for the worker");
    let queue = Arc::new(JobQueue::new(redis_url).expect("Failed to initialize job queue"));

    let credentials = config
        .generation_credentials()
        .expect("Face swap credentials are required for the worker");
    let limits = config.generation_limits();
    let client = GradioFaceSwapClient::new(credentials, limits.call_timeout)
        .expect("Failed to initialize face swap client");
    let runner = Arc::new(GenerationRunner::new(
        store.clone(),
        Arc::new(client),
        limits.hard_timeout,
    ));

    let permits = Arc::new(Semaphore::new(config.worker_concurrency.max(1)));
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, draining in-flight jobs");
            shutdown.cancel();
        }
    });

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, starting job processing loop"
    );

    // Main processing loop
    while !shutdown.is_cancelled() {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        match process_next_job(&queue, &runner, store.as_ref()).await {
            Ok(Some(job)) => {
                tokio::spawn(async move {
                    job.await;
                    drop(permit);
                });
            }
            Ok(None) => {
                // No job available, sleep before next poll
                drop(permit);
                tracing::trace!("No jobs available, sleeping");
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = sleep(Duration::from_millis(POLL_INTERVAL_MS)) => {}
                }
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Error fetching job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }

    // Wait for in-flight jobs to record their outcome.
    let _ = permits
        .acquire_many(config.worker_concurrency.max(1) as u32)
        .await;
    tracing::info!("Worker stopped");
}

/// Take the next job off the queue. Returns a future that runs it to a
/// terminal state, or `None` if the queue is empty.
async fn process_next_job(
    queue: &Arc<JobQueue>,
    runner: &Arc<GenerationRunner>,
    store: &dyn JobStore,
) -> Result<Option<impl std::future::Future<Output = ()>>, Box<dyn std::error::Error>> {
    // Dequeue next job
    let (payload, queued) = match queue.dequeue().await? {
        Some(entry) => entry,
        None => return Ok(None), // No job available
    };
    let job_id = queued.job_id;

    tracing::info!(job_id = %job_id, "Processing face swap job");

    let task = match queued.into_task() {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Discarding malformed job payload");
            record_failure(store, job_id, GENERIC_FAILURE_MESSAGE).await;
            None
        }
    };

    let queue = queue.clone();
    let runner = runner.clone();
    Ok(Some(async move {
        if let Some(task) = task {
            let worker = tokio::spawn({
                let runner = runner.clone();
                async move { runner.run(task).await }
            });
            if let Err(e) = worker.await {
                tracing::error!(job_id = %job_id, error = %e, "Generation task aborted");
                runner.record_failure(job_id, GENERIC_FAILURE_MESSAGE).await;
            }
        }

        // Mark job as complete in queue
        if let Err(e) = queue.complete(&payload).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to remove job from processing list");
        }
    }))
}
