use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use card_faceswap::{
    app_state::{build_job_store, AppState},
    config::AppConfig,
    routes::{self, metrics::MetricsState},
    services::{
        dispatch::{JobDispatcher, LocalWorkerPool},
        faceswap::GradioFaceSwapClient,
        generation::GenerationRunner,
        jobs::JobService,
        queue::JobQueue,
        retention::{self, RetentionPolicy},
        scryfall::ScryfallClient,
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
    config
        .validate_deployment()
        .expect("Invalid deployment configuration");

    tracing::info!("Initializing card-faceswap server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    routes::metrics::describe_metrics();

    let store = build_job_store(&config)
        .await
        .expect("Failed to initialize job store");

    let queue = match config.redis_url.as_deref() {
        Some(redis_url) => {
            tracing::info!("Connecting to Redis job queue");
            Some(Arc::new(
                JobQueue::new(redis_url).expect("Failed to initialize job queue"),
            ))
        }
        None => None,
    };

    let shutdown = CancellationToken::new();

    // Without credentials the server still answers status and card queries,
    // but refuses new submissions.
    let jobs = match config.generation_credentials() {
        Ok(credentials) => {
            let dispatcher: Arc<dyn JobDispatcher> = match &queue {
                Some(queue) => {
                    tracing::info!("Dispatching jobs to Redis workers");
                    queue.clone()
                }
                None => {
                    let limits = config.generation_limits();
                    tracing::info!(
                        space = %credentials.space_url,
                        concurrency = config.worker_concurrency,
                        "Starting in-process generation workers"
                    );
                    let client = GradioFaceSwapClient::new(credentials, limits.call_timeout)
                        .expect("Failed to initialize face swap client");
                    let runner = Arc::new(GenerationRunner::new(
                        store.clone(),
                        Arc::new(client),
                        limits.hard_timeout,
                    ));
                    let (pool, _supervisor) =
                        LocalWorkerPool::start(runner, config.worker_concurrency, shutdown.clone());
                    Arc::new(pool)
                }
            };
            JobService::new(store.clone(), dispatcher)
                .with_dispatch_timeout(config.dispatch_timeout())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Face swap submissions disabled");
            JobService::unconfigured(store.clone(), e)
        }
    };

    let _sweeper = retention::spawn_sweeper(
        store.clone(),
        queue.clone(),
        RetentionPolicy {
            retention: Duration::from_secs(config.job_retention_secs),
            stale_after: Duration::from_secs(config.job_stale_secs),
            interval: Duration::from_secs(config.retention_sweep_secs),
        },
        shutdown.clone(),
    );

    let scryfall =
        ScryfallClient::new(&config.scryfall_api_url).expect("Failed to initialize Scryfall client");

    let metrics_state = MetricsState {
        handle: Arc::new(prometheus_handle),
        queue: queue.clone(),
    };
    let state = AppState::new(jobs, scryfall, queue);
    let app = routes::router(state, metrics_state, config.max_upload_bytes);

    tracing::info!("Starting card-faceswap on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
        })
        .await
        .expect("Server error");
}
