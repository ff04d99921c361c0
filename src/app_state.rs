use std::sync::Arc;

use crate::config::{AppConfig, JobStoreKind};
use crate::db::{self, PostgresJobStore};
use crate::services::{
    jobs::JobService,
    queue::JobQueue,
    scryfall::ScryfallClient,
    store::{InMemoryJobStore, JobStore},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub scryfall: Arc<ScryfallClient>,
    /// Present when jobs are executed by out-of-process workers.
    pub queue: Option<Arc<JobQueue>>,
}

impl AppState {
    pub fn new(jobs: JobService, scryfall: ScryfallClient, queue: Option<Arc<JobQueue>>) -> Self {
        Self {
            jobs: Arc::new(jobs),
            scryfall: Arc::new(scryfall),
            queue,
        }
    }
}

/// Open the job store selected by `JOB_STORE`, running migrations for Postgres.
pub async fn build_job_store(
    config: &AppConfig,
) -> Result<Arc<dyn JobStore>, Box<dyn std::error::Error>> {
    match config.job_store {
        JobStoreKind::Memory => {
            tracing::info!("Using in-memory job store");
            Ok(Arc::new(InMemoryJobStore::new()))
        }
        JobStoreKind::Postgres => {
            tracing::info!("Connecting to PostgreSQL job store");
            let pool = db::init_pool(config.require_database_url()?).await?;

            tracing::info!("Running database migrations");
            db::run_migrations(&pool).await?;

            Ok(Arc::new(PostgresJobStore::new(pool)))
        }
    }
}
