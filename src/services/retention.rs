use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::faceswap::TIMEOUT_MESSAGE;
use crate::services::queue::JobQueue;
use crate::services::store::{JobStore, StoreError};

/// Shortest period the background sweeper will run at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long jobs are kept around.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Terminal jobs older than this are deleted.
    pub retention: Duration,
    /// Running jobs untouched for this long are failed. Must exceed the
    /// generation hard timeout.
    pub stale_after: Duration,
    /// Time between sweeps.
    pub interval: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: u64,
    pub failed_stale: u64,
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run one sweep against `store` as of `now`.
///
/// Only `processing` jobs can go stale. A `pending` job is still waiting for
/// a worker, however long the backlog.
pub async fn sweep(
    store: &dyn JobStore,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport, StoreError> {
    let failed_stale = store
        .fail_stale_before(cutoff(now, policy.stale_after), TIMEOUT_MESSAGE)
        .await?;
    let evicted = store
        .evict_terminal_before(cutoff(now, policy.retention))
        .await?;

    Ok(SweepReport {
        evicted,
        failed_stale,
    })
}

/// Sweep periodically until `shutdown` fires. With a `queue`, each sweep
/// also clears processing-list entries whose job already finished.
pub fn spawn_sweeper(
    store: Arc<dyn JobStore>,
    queue: Option<Arc<JobQueue>>,
    policy: RetentionPolicy,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match sweep(store.as_ref(), &policy, Utc::now()).await {
                Ok(report) => {
                    metrics::counter!("faceswap_jobs_evicted").increment(report.evicted);
                    if report.evicted > 0 || report.failed_stale > 0 {
                        tracing::info!(
                            evicted = report.evicted,
                            failed_stale = report.failed_stale,
                            "Job retention sweep"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "Job retention sweep failed"),
            }

            if let Some(queue) = &queue {
                match queue.reclaim_finished(store.as_ref()).await {
                    Ok(0) => {}
                    Ok(reclaimed) => {
                        metrics::counter!("faceswap_queue_reclaimed").increment(reclaimed);
                        tracing::info!(reclaimed, "Removed orphaned processing entries");
                    }
                    Err(e) => tracing::warn!(error = %e, "Processing list cleanup failed"),
                }
            }
        }
    })
}
