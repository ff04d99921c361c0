use garde::Validate;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::models::faceswap::FaceSwapRequest;
use crate::models::job::Job;
use crate::services::dispatch::JobDispatcher;
use crate::services::faceswap::GENERIC_FAILURE_MESSAGE;
use crate::services::generation::{record_failure, GenerationTask};
use crate::services::store::{JobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to create job: {0}")]
    Store(#[from] StoreError),
}

/// Upper bound on handing a task to its dispatcher during submit.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Entry point for face-swap jobs: submission and status lookup.
pub struct JobService {
    store: Arc<dyn JobStore>,
    dispatcher: Result<Arc<dyn JobDispatcher>, ConfigError>,
    dispatch_timeout: Duration,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            store,
            dispatcher: Ok(dispatcher),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// A service that can answer status queries but refuses submissions
    /// because generation is not configured.
    pub fn unconfigured(store: Arc<dyn JobStore>, reason: ConfigError) -> Self {
        Self {
            store,
            dispatcher: Err(reason),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create a `pending` job and hand it to a worker without waiting for
    /// generation. Only configuration and input problems fail here; anything
    /// that goes wrong later is recorded on the job.
    pub async fn submit(
        &self,
        source_image: Vec<u8>,
        target_image_url: &str,
    ) -> Result<Uuid, SubmitError> {
        let dispatcher = self.dispatcher.as_ref().map_err(|e| e.clone())?;
        validate_submission(&source_image, target_image_url)?;

        let job = Job::new_pending(Uuid::new_v4());
        self.store.insert(&job).await?;
        metrics::counter!("faceswap_jobs_total").increment(1);

        let task = GenerationTask {
            job_id: job.id,
            source_image,
            target_image_url: target_image_url.to_string(),
        };

        match tokio::time::timeout(self.dispatch_timeout, dispatcher.dispatch(task)).await {
            Ok(Ok(())) => {
                tracing::info!(job_id = %job.id, "Face swap job submitted");
            }
            Ok(Err(e)) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to dispatch face swap job");
                record_failure(self.store.as_ref(), job.id, GENERIC_FAILURE_MESSAGE).await;
            }
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_ms = self.dispatch_timeout.as_millis() as u64,
                    "Timed out dispatching face swap job"
                );
                record_failure(self.store.as_ref(), job.id, GENERIC_FAILURE_MESSAGE).await;
            }
        }

        Ok(job.id)
    }

    /// Current snapshot of a job. Never mutates.
    pub async fn status(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.store.get(job_id).await
    }
}

fn validate_submission(source_image: &[u8], target_image_url: &str) -> Result<(), SubmitError> {
    if source_image.is_empty() {
        return Err(SubmitError::Validation("source image is empty".to_string()));
    }
    image::guess_format(source_image)
        .map_err(|_| SubmitError::Validation("source image is not a supported image format".to_string()))?;

    let request = FaceSwapRequest {
        target_image_url: target_image_url.to_string(),
    };
    request
        .validate()
        .map_err(|report| SubmitError::Validation(report.to_string()))?;

    let url = Url::parse(target_image_url)
        .map_err(|e| SubmitError::Validation(format!("target_image_url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(SubmitError::Validation(
            "target_image_url: must be an http(s) URL".to_string(),
        ));
    }

    Ok(())
}
