use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::services::faceswap::{FaceSwapBackend, GenerationError};
use crate::services::store::{JobStore, StoreError};

/// Everything a worker needs to run one job.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub job_id: Uuid,
    pub source_image: Vec<u8>,
    pub target_image_url: String,
}

/// Runs generation tasks and records their single terminal outcome.
pub struct GenerationRunner {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn FaceSwapBackend>,
    hard_timeout: Duration,
}

impl GenerationRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn FaceSwapBackend>,
        hard_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            hard_timeout,
        }
    }

    /// Run a task to completion. Returns the job's terminal snapshot, or
    /// `None` when the job was gone or already finished before we started.
    pub async fn run(&self, task: GenerationTask) -> Option<Job> {
        let job_id = task.job_id;

        match self.store.mark_processing(job_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(job_id = %job_id, "Job vanished before generation started");
                return None;
            }
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::warn!(job_id = %job_id, status = %from, "Job no longer runnable, skipping");
                return None;
            }
            Err(e) => {
                // The job is still pending; try to finish it anyway so it
                // cannot stay pending forever.
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark job processing");
            }
        }

        tracing::info!(job_id = %job_id, card_url = %task.target_image_url, "Starting face swap generation");
        let start = Instant::now();

        let outcome = match tokio::time::timeout(
            self.hard_timeout,
            self.backend
                .generate(&task.source_image, &task.target_image_url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout),
        };

        let elapsed = start.elapsed();
        metrics::histogram!("faceswap_generation_seconds").record(elapsed.as_secs_f64());

        let written = match outcome {
            Ok(result_url) => {
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    result_url = %result_url,
                    "Face swap completed"
                );
                let written = self.store.complete(job_id, result_url).await;
                if written.is_ok() {
                    metrics::counter!("faceswap_jobs_completed").increment(1);
                }
                written
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Face swap failed"
                );
                let written = self.store.fail(job_id, e.user_message().to_string()).await;
                if written.is_ok() {
                    if e.is_timeout() {
                        metrics::counter!("faceswap_jobs_timed_out").increment(1);
                    }
                    metrics::counter!("faceswap_jobs_failed").increment(1);
                }
                written
            }
        };

        match written {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
                None
            }
        }
    }

    /// Record a failure for a job whose task never produced an outcome.
    pub async fn record_failure(&self, job_id: Uuid, message: &str) {
        record_failure(self.store.as_ref(), job_id, message).await;
    }
}

/// Move a job to `error` unless it already reached a terminal state.
pub async fn record_failure(store: &dyn JobStore, job_id: Uuid, message: &str) {
    match store.fail(job_id, message.to_string()).await {
        Ok(_) => {
            metrics::counter!("faceswap_jobs_failed").increment(1);
        }
        Err(StoreError::InvalidTransition {
            from: JobStatus::Completed | JobStatus::Error,
            ..
        }) => {}
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::faceswap::{GENERIC_FAILURE_MESSAGE, TIMEOUT_MESSAGE};
    use crate::services::store::InMemoryJobStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct Fixed(Result<&'static str, fn() -> GenerationError>);

    #[async_trait]
    impl FaceSwapBackend for Fixed {
        async fn generate(&self, _: &[u8], _: &str) -> Result<String, GenerationError> {
            self.0.map(str::to_string).map_err(|make| make())
        }
    }

    struct Hangs;

    #[async_trait]
    impl FaceSwapBackend for Hangs {
        async fn generate(&self, _: &[u8], _: &str) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("https://example/never.png".to_string())
        }
    }

    async fn pending_task(store: &InMemoryJobStore) -> GenerationTask {
        let job = Job::new_pending(Uuid::new_v4());
        store.insert(&job).await.unwrap();
        GenerationTask {
            job_id: job.id,
            source_image: vec![1, 2, 3],
            target_image_url: "https://example/target.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let store = Arc::new(InMemoryJobStore::new());
        let task = pending_task(&store).await;
        let runner = GenerationRunner::new(
            store.clone(),
            Arc::new(Fixed(Ok("https://example/result.png"))),
            Duration::from_secs(5),
        );

        let job = runner.run(task.clone()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(
            store.get(task.job_id).await.unwrap().result_url(),
            Some("https://example/result.png")
        );
    }

    #[tokio::test]
    async fn test_remote_error_records_generic_message() {
        let store = Arc::new(InMemoryJobStore::new());
        let task = pending_task(&store).await;
        let runner = GenerationRunner::new(
            store.clone(),
            Arc::new(Fixed(Err(|| GenerationError::MissingResult))),
            Duration::from_secs(5),
        );

        let job = runner.run(task).await.unwrap();
        assert_eq!(job.error_message(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_timeout_records_timeout_message() {
        let store = Arc::new(InMemoryJobStore::new());
        let task = pending_task(&store).await;
        let runner = GenerationRunner::new(store.clone(), Arc::new(Hangs), Duration::from_secs(110));

        let job = runner.run(task).await.unwrap();
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.error_message(), Some(TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_finished_job_is_not_rerun() {
        let store = Arc::new(InMemoryJobStore::new());
        let task = pending_task(&store).await;
        store.fail(task.job_id, "abandoned".to_string()).await.unwrap();

        let runner = GenerationRunner::new(
            store.clone(),
            Arc::new(Fixed(Ok("https://example/result.png"))),
            Duration::from_secs(5),
        );

        assert!(runner.run(task.clone()).await.is_none());
        assert_eq!(
            store.get(task.job_id).await.unwrap().error_message(),
            Some("abandoned")
        );
    }

    #[tokio::test]
    async fn test_record_failure_keeps_existing_outcome() {
        let store = InMemoryJobStore::new();
        let task = pending_task(&store).await;
        store
            .complete(task.job_id, "https://example/result.png".to_string())
            .await
            .unwrap();

        record_failure(&store, task.job_id, GENERIC_FAILURE_MESSAGE).await;
        assert_eq!(
            store.get(task.job_id).await.unwrap().status(),
            JobStatus::Completed
        );
    }

    /// Succeeds, but only after the job was already failed elsewhere.
    struct FinishesLate {
        store: Arc<InMemoryJobStore>,
    }

    #[async_trait]
    impl FaceSwapBackend for FinishesLate {
        async fn generate(&self, _: &[u8], _: &str) -> Result<String, GenerationError> {
            let stalled = self.store.fail_stale_before(Utc::now() + chrono::Duration::hours(1), TIMEOUT_MESSAGE);
            assert_eq!(stalled.await.unwrap(), 1);
            Ok("https://example/late.png".to_string())
        }
    }

    #[test]
    fn test_rejected_write_is_not_counted_as_completed() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (outcome, stored) = metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let store = Arc::new(InMemoryJobStore::new());
                let task = pending_task(&store).await;
                let runner = GenerationRunner::new(
                    store.clone(),
                    Arc::new(FinishesLate {
                        store: store.clone(),
                    }),
                    Duration::from_secs(5),
                );
                let outcome = runner.run(task.clone()).await;
                (outcome, store.get(task.job_id).await.unwrap())
            })
        });

        assert!(outcome.is_none());
        assert_eq!(stored.error_message(), Some(TIMEOUT_MESSAGE));

        let rendered = handle.render();
        assert!(rendered.contains("faceswap_generation_seconds"), "{rendered}");
        assert!(!rendered.contains("faceswap_jobs_completed"), "{rendered}");
    }
}
