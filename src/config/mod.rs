use serde::Deserialize;
use std::time::Duration;
use url::Url;

const HF_TOKEN_PREFIX: &str = "hf_";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStoreKind {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Hugging Face access token, with or without the `hf_` prefix
    pub hugging_face_token: Option<String>,

    /// Gradio space running the face-swap model: `owner/name` or a full URL
    pub hugging_face_space: Option<String>,

    /// Named Gradio endpoint to call
    #[serde(default = "default_gradio_api_name")]
    pub gradio_api_name: String,

    /// Scryfall API root
    #[serde(default = "default_scryfall_api_url")]
    pub scryfall_api_url: String,

    /// Which job store backs the status endpoint
    #[serde(default = "default_job_store")]
    pub job_store: JobStoreKind,

    /// PostgreSQL connection string (required for the postgres store)
    pub database_url: Option<String>,

    /// Redis connection string; when set, jobs go through the Redis queue
    /// and are executed by the `worker` binary
    pub redis_url: Option<String>,

    /// Generation tasks running at once in the in-process pool
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Timeout applied to each outbound request of a generation task
    #[serde(default = "default_call_timeout_secs")]
    pub generation_call_timeout_secs: u64,

    /// Upper bound on a whole generation task
    #[serde(default = "default_hard_timeout_secs")]
    pub generation_hard_timeout_secs: u64,

    /// How long finished jobs stay queryable
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    /// Running jobs untouched for this long are failed; must exceed the hard timeout
    #[serde(default = "default_job_stale_secs")]
    pub job_stale_secs: u64,

    /// Interval between retention sweeps
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// How long a submission may wait on handing its job to a worker
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gradio_api_name() -> String {
    "predict".to_string()
}

fn default_scryfall_api_url() -> String {
    "https://api.scryfall.com".to_string()
}

fn default_job_store() -> JobStoreKind {
    JobStoreKind::Memory
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    100
}

fn default_hard_timeout_secs() -> u64 {
    110
}

fn default_job_retention_secs() -> u64 {
    3600
}

fn default_job_stale_secs() -> u64 {
    600
}

fn default_retention_sweep_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_dispatch_timeout_ms() -> u64 {
    2000
}

/// Credentials and endpoint for the remote face-swap model.
#[derive(Debug, Clone)]
pub struct GenerationCredentials {
    pub token: String,
    pub space_url: Url,
    pub api_name: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Face swap generation is not configured: {0} is missing")]
    MissingCredential(&'static str),

    #[error("Invalid HUGGING_FACE_SPACE value '{0}'")]
    InvalidSpace(String),

    #[error("{0} must be set when {1}")]
    MissingSetting(&'static str, &'static str),

    #[error("REDIS_URL requires JOB_STORE=postgres so workers can report results")]
    QueueWithoutSharedStore,

    #[error("{0} must be greater than zero")]
    ZeroSetting(&'static str),

    #[error("JOB_STALE_SECS ({stale}) must exceed GENERATION_HARD_TIMEOUT_SECS ({hard_timeout})")]
    StaleWithinHardTimeout { stale: u64, hard_timeout: u64 },
}

/// Timing limits for a generation task.
#[derive(Debug, Clone, Copy)]
pub struct GenerationLimits {
    pub call_timeout: Duration,
    pub hard_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Credentials for the generation endpoint, or which one is missing.
    pub fn generation_credentials(&self) -> Result<GenerationCredentials, ConfigError> {
        let token = non_empty(self.hugging_face_token.as_deref())
            .ok_or(ConfigError::MissingCredential("HUGGING_FACE_TOKEN"))?;
        let space = non_empty(self.hugging_face_space.as_deref())
            .ok_or(ConfigError::MissingCredential("HUGGING_FACE_SPACE"))?;

        Ok(GenerationCredentials {
            token: normalize_hf_token(token),
            space_url: space_base_url(space)?,
            api_name: self.gradio_api_name.trim_matches('/').to_string(),
        })
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn generation_limits(&self) -> GenerationLimits {
        GenerationLimits {
            call_timeout: Duration::from_secs(self.generation_call_timeout_secs),
            hard_timeout: Duration::from_secs(self.generation_hard_timeout_secs),
        }
    }

    /// Reject combinations that would strand jobs.
    pub fn validate_deployment(&self) -> Result<(), ConfigError> {
        let positive = [
            ("WORKER_CONCURRENCY", self.worker_concurrency as u64),
            ("GENERATION_CALL_TIMEOUT_SECS", self.generation_call_timeout_secs),
            ("GENERATION_HARD_TIMEOUT_SECS", self.generation_hard_timeout_secs),
            ("RETENTION_SWEEP_SECS", self.retention_sweep_secs),
            ("DISPATCH_TIMEOUT_MS", self.dispatch_timeout_ms),
        ];
        if let Some((name, _)) = positive.into_iter().find(|&(_, value)| value == 0) {
            return Err(ConfigError::ZeroSetting(name));
        }
        if self.job_stale_secs <= self.generation_hard_timeout_secs {
            return Err(ConfigError::StaleWithinHardTimeout {
                stale: self.job_stale_secs,
                hard_timeout: self.generation_hard_timeout_secs,
            });
        }
        if self.redis_url.is_some() && self.job_store == JobStoreKind::Memory {
            return Err(ConfigError::QueueWithoutSharedStore);
        }
        if self.job_store == JobStoreKind::Postgres {
            self.require_database_url()?;
        }
        Ok(())
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        non_empty(self.database_url.as_deref())
            .ok_or(ConfigError::MissingSetting("DATABASE_URL", "JOB_STORE=postgres"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Tokens are accepted with or without their `hf_` prefix.
pub fn normalize_hf_token(token: &str) -> String {
    if token.starts_with(HF_TOKEN_PREFIX) {
        token.to_string()
    } else {
        format!("{HF_TOKEN_PREFIX}{token}")
    }
}

/// Map a space identifier to its base URL.
///
/// `owner/name` becomes `https://owner-name.hf.space/`; anything that already
/// looks like an http(s) URL is used as-is.
pub fn space_base_url(space: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidSpace(space.to_string());

    if space.starts_with("http://") || space.starts_with("https://") {
        let mut url = Url::parse(space).map_err(|_| invalid())?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        return Ok(url);
    }

    let (owner, name) = space.split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return Err(invalid());
    }

    let subdomain = format!("{owner}-{name}")
        .to_lowercase()
        .replace(['_', '.'], "-");
    Url::parse(&format!("https://{subdomain}.hf.space/")).map_err(|_| invalid())
}
