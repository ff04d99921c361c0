use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::faceswap::GENERIC_FAILURE_MESSAGE;
use crate::services::generation::{GenerationRunner, GenerationTask};
use crate::services::queue::QueueError;

/// Hands a generation task to whatever executes it. Must not wait for the
/// task itself to run.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, task: GenerationTask) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker pool is shut down")]
    Closed,

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// In-process worker pool for single-instance deployments.
///
/// Submissions go through an unbounded channel so `dispatch` never blocks;
/// a supervisor drains it and runs at most `concurrency` tasks at a time.
pub struct LocalWorkerPool {
    sender: mpsc::UnboundedSender<GenerationTask>,
}

impl LocalWorkerPool {
    /// Start the supervisor. It stops taking new tasks once `shutdown` fires;
    /// tasks already running finish on their own.
    pub fn start(
        runner: Arc<GenerationRunner>,
        concurrency: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(supervise(runner, receiver, concurrency.max(1), shutdown));
        (Self { sender }, handle)
    }
}

#[async_trait]
impl JobDispatcher for LocalWorkerPool {
    async fn dispatch(&self, task: GenerationTask) -> Result<(), DispatchError> {
        self.sender.send(task).map_err(|_| DispatchError::Closed)
    }
}

async fn supervise(
    runner: Arc<GenerationRunner>,
    mut receiver: mpsc::UnboundedReceiver<GenerationTask>,
    concurrency: usize,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    tracing::info!(concurrency, "Generation worker pool started");

    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                runner.record_failure(task.job_id, GENERIC_FAILURE_MESSAGE).await;
                break;
            }
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let runner = runner.clone();
        tokio::spawn(async move {
            let job_id = task.job_id;
            let worker = tokio::spawn({
                let runner = runner.clone();
                async move { runner.run(task).await }
            });

            if let Err(e) = worker.await {
                tracing::error!(job_id = %job_id, error = %e, "Generation task aborted");
                runner.record_failure(job_id, GENERIC_FAILURE_MESSAGE).await;
            }
            drop(permit);
        });
    }

    // Anything still queued will never run.
    receiver.close();
    while let Some(task) = receiver.recv().await {
        runner.record_failure(task.job_id, GENERIC_FAILURE_MESSAGE).await;
    }
    tracing::info!("Generation worker pool stopped");
}
