use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{Job, JobState, JobStatus};
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = "id, status, result_url, error_message, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(id, format!("unknown status '{status_str}'")))?;

    let state = JobState::from_parts(
        status,
        row.try_get("result_url")?,
        row.try_get("error_message")?,
    )
    .ok_or_else(|| StoreError::Corrupt(id, format!("fields do not match status {status}")))?;

    Ok(Job {
        id,
        state,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new job
pub async fn create_job(pool: &PgPool, job: &Job) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO faceswap_jobs (id, status, result_url, error_message, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(job.id)
    .bind(job.status().to_string())
    .bind(job.result_url())
    .bind(job.error_message())
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AlreadyExists(job.id));
    }
    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM faceswap_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Move a job to `next`, but only from a status that allows it.
///
/// Returns `None` when no row matched, either because the job does not exist
/// or because its current status forbids the transition.
pub async fn transition_job(
    pool: &PgPool,
    job_id: Uuid,
    next: &JobState,
) -> Result<Option<Job>, StoreError> {
    let to = next.status();
    let allowed_from: Vec<String> = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Error,
    ]
    .into_iter()
    .filter(|from| from.can_transition_to(to))
    .map(|from| from.to_string())
    .collect();

    let (result_url, error_message) = match next {
        JobState::Completed { result_url } => (Some(result_url.as_str()), None),
        JobState::Error { message } => (None, Some(message.as_str())),
        JobState::Pending | JobState::Processing => (None, None),
    };

    let row = sqlx::query(&format!(
        r#"
        UPDATE faceswap_jobs
        SET status = $1,
            result_url = $2,
            error_message = $3,
            updated_at = NOW()
        WHERE id = $4 AND status = ANY($5)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(to.to_string())
    .bind(result_url)
    .bind(error_message)
    .bind(job_id)
    .bind(allowed_from)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Delete finished jobs older than `cutoff`
pub async fn delete_terminal_jobs_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM faceswap_jobs
        WHERE status IN ('completed', 'error')
          AND updated_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fail running jobs that have not progressed since `cutoff`
pub async fn fail_stale_jobs_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    message: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE faceswap_jobs
        SET status = 'error',
            error_message = $1,
            updated_at = NOW()
        WHERE status = 'processing'
          AND updated_at < $2
        "#,
    )
    .bind(message)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
