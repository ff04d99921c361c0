use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::{Job, JobState, JobStatus};

/// Keyed storage of job snapshots.
///
/// Implementations must apply every update atomically: a reader sees either
/// the old record or the new one. Updates only move a job forward; anything
/// else fails with [`StoreError::InvalidTransition`] and leaves the record
/// untouched.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Job, StoreError>;

    async fn update(&self, id: Uuid, next: JobState) -> Result<Job, StoreError>;

    /// Remove terminal jobs last updated before `cutoff`.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Fail `processing` jobs last updated before `cutoff`. Jobs still
    /// `pending` are waiting for a worker and are left alone.
    async fn fail_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn mark_processing(&self, id: Uuid) -> Result<Job, StoreError> {
        self.update(id, JobState::Processing).await
    }

    async fn complete(&self, id: Uuid, result_url: String) -> Result<Job, StoreError> {
        self.update(id, JobState::Completed { result_url }).await
    }

    async fn fail(&self, id: Uuid, message: String) -> Result<Job, StoreError> {
        self.update(id, JobState::Error { message }).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored job {0} is inconsistent: {1}")]
    Corrupt(Uuid, String),
}

/// Process-local job store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: Uuid, next: JobState) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.transition(next)
            .map_err(|(from, to)| StoreError::InvalidTransition { id, from, to })?;
        Ok(job.clone())
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status().is_terminal() && job.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn fail_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let mut failed = 0;
        for job in jobs.values_mut() {
            if job.status() == JobStatus::Processing && job.updated_at < cutoff {
                let failure = JobState::Error {
                    message: message.to_string(),
                };
                if job.transition(failure).is_ok() {
                    failed += 1;
                }
            }
        }
        Ok(failed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
