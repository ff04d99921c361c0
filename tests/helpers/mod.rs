//! Shared test utilities: stub generation backends and an in-process server.
#![allow(dead_code)]

use async_trait::async_trait;
use card_faceswap::{
    app_state::AppState,
    models::job::Job,
    routes::{self, metrics::MetricsState},
    services::{
        dispatch::{DispatchError, JobDispatcher, LocalWorkerPool},
        faceswap::{FaceSwapBackend, GenerationError},
        generation::{GenerationRunner, GenerationTask},
        jobs::JobService,
        scryfall::ScryfallClient,
        store::{InMemoryJobStore, JobStore},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 1x1 transparent PNG
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

pub const TARGET_URL: &str = "https://example/target.png";
pub const RESULT_URL: &str = "https://example/result.png";

/// Answers with `RESULT_URL` after `delay`.
pub struct SlowBackend {
    pub delay: Duration,
}

#[async_trait]
impl FaceSwapBackend for SlowBackend {
    async fn generate(&self, _: &[u8], _: &str) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        Ok(RESULT_URL.to_string())
    }
}

/// Fails the way an unreachable model does: the connection is refused.
pub struct UnreachableBackend;

#[async_trait]
impl FaceSwapBackend for UnreachableBackend {
    async fn generate(&self, _: &[u8], _: &str) -> Result<String, GenerationError> {
        // Port 9 (discard) is closed on test machines.
        reqwest::get("http://127.0.0.1:9/run/predict").await?;
        Err(GenerationError::MissingResult)
    }
}

/// Accepts tasks and keeps them, never starting one.
#[derive(Default)]
pub struct HoldingDispatcher {
    pub held: tokio::sync::Mutex<Vec<GenerationTask>>,
}

#[async_trait]
impl JobDispatcher for HoldingDispatcher {
    async fn dispatch(&self, task: GenerationTask) -> Result<(), DispatchError> {
        self.held.lock().await.push(task);
        Ok(())
    }
}

/// Store, pool and service wired together the way the server does it.
pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub jobs: JobService,
    pub shutdown: CancellationToken,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl Harness {
    pub fn new(backend: Arc<dyn FaceSwapBackend>, hard_timeout: Duration) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let shutdown = CancellationToken::new();
        let runner = Arc::new(GenerationRunner::new(store.clone(), backend, hard_timeout));
        let (pool, _supervisor) = LocalWorkerPool::start(runner, 4, shutdown.clone());
        let dispatcher: Arc<dyn JobDispatcher> = Arc::new(pool);
        let jobs = JobService::new(store.clone(), dispatcher.clone());

        Self {
            store,
            jobs,
            shutdown,
            dispatcher,
        }
    }

    /// Another service over the same store and workers, for handing to a server.
    pub fn jobs_handle(&self) -> JobService {
        JobService::new(self.store.clone(), self.dispatcher.clone())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Poll the service directly until the job is terminal.
pub async fn wait_until_terminal(jobs: &JobService, id: Uuid, timeout: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = jobs.status(id).await.expect("job should exist");
        if job.status().is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} still {} after {:?}",
            job.status(),
            timeout
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Serve the full router on an ephemeral port. Returns the base URL.
pub async fn spawn_server(jobs: JobService, scryfall_url: &str) -> String {
    let scryfall = ScryfallClient::new(scryfall_url).expect("scryfall client");
    let metrics = MetricsState {
        handle: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        queue: None,
    };
    let app = routes::router(AppState::new(jobs, scryfall, None), metrics, 10 * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    format!("http://{addr}")
}

/// A store handle usable where the service expects a trait object.
pub fn as_dyn(store: &Arc<InMemoryJobStore>) -> Arc<dyn JobStore> {
    store.clone()
}
