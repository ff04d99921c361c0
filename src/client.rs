//! HTTP client for the face-swap API, including the caller-side polling loop.

use reqwest::multipart;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::card::{CardPrint, ScryfallCard};
use crate::models::faceswap::FaceSwapResponse;
use crate::models::job::JobSnapshot;

/// Interval between status checks while waiting for a job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shorter intervals (including zero) are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Stopped waiting for job {0}")]
    Cancelled(Uuid),
}

pub struct FaceSwapApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl FaceSwapApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload a photo and the chosen card image URL.
    pub async fn submit(
        &self,
        source_image: Vec<u8>,
        file_name: &str,
        target_image_url: &str,
    ) -> Result<FaceSwapResponse, ClientError> {
        let form = multipart::Form::new()
            .part(
                "source_image",
                multipart::Part::bytes(source_image).file_name(file_name.to_string()),
            )
            .text("target_image_url", target_image_url.to_string());

        let response = self
            .http
            .post(format!("{}/api/v1/faceswap", self.base_url))
            .multipart(form)
            .send()
            .await?;

        Ok(api_result(response).await?.json().await?)
    }

    /// One status check.
    pub async fn status(&self, job_id: Uuid) -> Result<JobSnapshot, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/faceswap/{}", self.base_url, job_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(job_id));
        }
        Ok(api_result(response).await?.json().await?)
    }

    /// Poll every `interval` (at least [`MIN_POLL_INTERVAL`]), starting
    /// immediately, until the job reaches a terminal status or `cancel` fires.
    pub async fn wait_for_result(
        &self,
        job_id: Uuid,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<JobSnapshot, ClientError> {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled(job_id)),
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled(job_id)),
                snapshot = self.status(job_id) => snapshot?,
            };

            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tracing::debug!(job_id = %job_id, status = %snapshot.status, "Job still running");
        }
    }

    pub async fn search_cards(&self, query: &str) -> Result<Vec<ScryfallCard>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/cards/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await?;
        Ok(api_result(response).await?.json().await?)
    }

    pub async fn card_prints(&self, prints_search_uri: &str) -> Result<Vec<CardPrint>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/cards/prints", self.base_url))
            .query(&[("uri", prints_search_uri)])
            .send()
            .await?;
        Ok(api_result(response).await?.json().await?)
    }
}

/// Pass successful responses through; turn error bodies into `ClientError::Api`.
async fn api_result(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
