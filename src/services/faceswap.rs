use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::GenerationCredentials;

/// Recorded when the remote model does not answer in time.
pub const TIMEOUT_MESSAGE: &str = "Image generation took too long. Please try again.";

/// Recorded for every other generation failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate the image. Please try again.";

/// Something that can composite a face onto a card image.
#[async_trait]
pub trait FaceSwapBackend: Send + Sync {
    /// Swap the face in `source_image` onto the card at `target_image_url` and
    /// return a URL to the generated image.
    async fn generate(
        &self,
        source_image: &[u8],
        target_image_url: &str,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Remote call timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Target image unusable: {0}")]
    TargetImage(String),

    #[error("Generation response has no result image")]
    MissingResult,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Http(err)
        }
    }
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Timeout)
    }

    /// Message stored on the job for the end user.
    pub fn user_message(&self) -> &'static str {
        if self.is_timeout() {
            TIMEOUT_MESSAGE
        } else {
            GENERIC_FAILURE_MESSAGE
        }
    }
}

/// Client for a Gradio face-swap app hosted as a Hugging Face Space.
pub struct GradioFaceSwapClient {
    http: Client,
    credentials: GenerationCredentials,
}

#[derive(Deserialize)]
struct GradioResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl GradioFaceSwapClient {
    /// `call_timeout` bounds each outbound request (target fetch, model call).
    pub fn new(
        credentials: GenerationCredentials,
        call_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(call_timeout)
            .user_agent(concat!("card-faceswap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GenerationError::Http)?;

        Ok(Self { http, credentials })
    }

    fn predict_url(&self) -> Result<Url, GenerationError> {
        self.credentials
            .space_url
            .join(&format!("run/{}", self.credentials.api_name))
            .map_err(|e| GenerationError::TargetImage(format!("bad endpoint: {e}")))
    }

    async fn fetch_target_image(&self, target_image_url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .http
            .get(target_image_url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(GenerationError::TargetImage("empty body".to_string()));
        }
        image::guess_format(&bytes)
            .map_err(|e| GenerationError::TargetImage(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    /// Turn the first result entry into an absolute URL.
    fn result_url(&self, entry: &serde_json::Value) -> Result<String, GenerationError> {
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        };

        if let Some(url) = field("url") {
            return self
                .credentials
                .space_url
                .join(url)
                .map(String::from)
                .map_err(|_| GenerationError::MissingResult);
        }

        // Older Gradio builds only return the server-side path.
        let path = field("path").or_else(|| field("name")).ok_or(GenerationError::MissingResult)?;
        self.credentials
            .space_url
            .join(&format!("file={path}"))
            .map(String::from)
            .map_err(|_| GenerationError::MissingResult)
    }
}

/// Gradio file payload carrying the image inline as a data URL.
fn file_payload(name: &str, bytes: &[u8]) -> serde_json::Value {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    serde_json::json!({
        "name": name,
        "data": format!("data:{mime};base64,{encoded}"),
        "is_file": false,
        "meta": { "_type": "gradio.FileData" }
    })
}

#[async_trait]
impl FaceSwapBackend for GradioFaceSwapClient {
    async fn generate(
        &self,
        source_image: &[u8],
        target_image_url: &str,
    ) -> Result<String, GenerationError> {
        tracing::debug!(target_image_url, "Fetching card image");
        let target_image = self.fetch_target_image(target_image_url).await?;

        let request_body = serde_json::json!({
            "data": [
                file_payload("source", source_image),
                file_payload("target", &target_image),
                true
            ]
        });

        let url = self.predict_url()?;
        tracing::debug!(%url, "Sending face swap request to model");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.credentials.token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let gradio: GradioResponse = response.json().await?;
        let first = gradio.data.first().ok_or(GenerationError::MissingResult)?;
        self.result_url(first)
    }
}
