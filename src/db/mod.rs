use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, JobState};
use crate::services::store::{JobStore, StoreError};

pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Job store backed by the `faceswap_jobs` table. Survives restarts and can be
/// shared by several API instances and workers.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        queries::create_job(&self.pool, job).await
    }

    async fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        queries::get_job(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: Uuid, next: JobState) -> Result<Job, StoreError> {
        let to = next.status();
        match queries::transition_job(&self.pool, id, &next).await? {
            Some(job) => Ok(job),
            None => {
                let current = self.get(id).await?;
                Err(StoreError::InvalidTransition {
                    id,
                    from: current.status(),
                    to,
                })
            }
        }
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(queries::delete_terminal_jobs_before(&self.pool, cutoff).await?)
    }

    async fn fail_stale_before(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, StoreError> {
        Ok(queries::fail_stale_jobs_before(&self.pool, cutoff, message).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
