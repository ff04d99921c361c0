use async_trait::async_trait;
use base64::Engine;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::Job;
use crate::services::dispatch::{DispatchError, JobDispatcher};
use crate::services::generation::GenerationTask;
use crate::services::store::{JobStore, StoreError};

const QUEUE_KEY: &str = "card_faceswap:jobs";
const PROCESSING_KEY: &str = "card_faceswap:processing";

/// Job payload serialized into Redis. The source photo travels inline,
/// base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub source_image: String,
    pub target_image_url: String,
}

impl From<&GenerationTask> for QueuedJob {
    fn from(task: &GenerationTask) -> Self {
        Self {
            job_id: task.job_id,
            source_image: base64::engine::general_purpose::STANDARD.encode(&task.source_image),
            target_image_url: task.target_image_url.clone(),
        }
    }
}

/// Just the id of a queued payload, without decoding the photo.
#[derive(Deserialize)]
struct PayloadId {
    job_id: Uuid,
}

/// A processing-list entry can go once its job has an outcome or no longer exists.
fn is_reclaimable(lookup: &Result<Job, StoreError>) -> bool {
    match lookup {
        Ok(job) => job.status().is_terminal(),
        Err(StoreError::NotFound(_)) => true,
        Err(_) => false,
    }
}

impl QueuedJob {
    pub fn into_task(self) -> Result<GenerationTask, QueueError> {
        let source_image = base64::engine::general_purpose::STANDARD
            .decode(&self.source_image)
            .map_err(QueueError::Payload)?;
        Ok(GenerationTask {
            job_id: self.job_id,
            source_image,
            target_image_url: self.target_image_url,
        })
    }
}

/// Redis-backed job queue shared by API instances and `worker` processes.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a generation job.
    pub async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue a job for processing (pop with move to processing list).
    ///
    /// Returns the raw payload alongside the job so the exact entry can be
    /// removed from the processing list later.
    pub async fn dequeue(&self) -> Result<Option<(String, QueuedJob)>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some((payload, job)))
            }
            None => Ok(None),
        }
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (jobs waiting for a worker).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    /// Remove a finished job's payload from the processing list.
    pub async fn complete(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Drop processing-list entries left behind by workers that died after
    /// taking a job. Entries whose job is still running are kept.
    pub async fn reclaim_finished(&self, store: &dyn JobStore) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payloads: Vec<String> = conn
            .lrange(PROCESSING_KEY, 0, -1)
            .await
            .map_err(QueueError::Redis)?;

        let mut reclaimed = 0;
        for payload in payloads {
            let remove = match serde_json::from_str::<PayloadId>(&payload) {
                Ok(entry) => is_reclaimable(&store.get(entry.job_id).await),
                Err(_) => true,
            };
            if remove {
                let removed: u64 = conn
                    .lrem(PROCESSING_KEY, 1, &payload)
                    .await
                    .map_err(QueueError::Redis)?;
                reclaimed += removed;
            }
        }
        Ok(reclaimed)
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, task: GenerationTask) -> Result<(), DispatchError> {
        self.enqueue(&QueuedJob::from(&task)).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Malformed job payload: {0}")]
    Payload(#[from] base64::DecodeError),
}
