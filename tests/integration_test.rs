use card_faceswap::{
    config::AppConfig,
    db::{self, PostgresJobStore},
    models::job::{Job, JobState, JobStatus},
    services::{
        generation::GenerationTask,
        queue::{JobQueue, QueuedJob},
        retention::{self, RetentionPolicy},
        store::{JobStore, StoreError},
    },
};
use std::time::Duration;
use uuid::Uuid;

/// Integration test: shared job store and Redis queue
///
/// This test verifies the pieces a multi-process deployment relies on:
/// 1. Database connection and schema
/// 2. Job lifecycle writes (pending -> processing -> completed)
/// 3. Terminal states reject further writes
/// 4. Job queue (enqueue/dequeue/complete)
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via DATABASE_URL and REDIS_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let pool = db::init_pool(config.require_database_url().expect("DATABASE_URL"))
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let store = PostgresJobStore::new(pool);

    // Job lifecycle
    let job = Job::new_pending(Uuid::new_v4());
    store.insert(&job).await.expect("Failed to create job");
    assert!(matches!(
        store.insert(&job).await,
        Err(StoreError::AlreadyExists(_))
    ));

    let fetched = store.get(job.id).await.expect("Failed to fetch job");
    assert_eq!(fetched.status(), JobStatus::Pending);

    store
        .mark_processing(job.id)
        .await
        .expect("Failed to mark processing");
    let completed = store
        .complete(job.id, "https://example/result.png".to_string())
        .await
        .expect("Failed to complete job");
    assert_eq!(completed.result_url(), Some("https://example/result.png"));

    match store.fail(job.id, "late failure".to_string()).await {
        Err(StoreError::InvalidTransition { from, to, .. }) => {
            assert_eq!(from, JobStatus::Completed);
            assert_eq!(to, JobStatus::Error);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(store.get(job.id).await.unwrap(), completed);

    // Queue round trip
    let queue = JobQueue::new(config.redis_url.as_deref().expect("REDIS_URL"))
        .expect("Failed to initialize queue");
    queue.health_check().await.expect("Redis unreachable");

    let task = GenerationTask {
        job_id: Uuid::new_v4(),
        source_image: vec![0x89, b'P', b'N', b'G'],
        target_image_url: "https://example/target.png".to_string(),
    };
    queue
        .enqueue(&QueuedJob::from(&task))
        .await
        .expect("Failed to enqueue");

    let (payload, queued) = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("Queue should not be empty");
    assert_eq!(queued.job_id, task.job_id);
    let restored = queued.into_task().expect("payload should decode");
    assert_eq!(restored.source_image, task.source_image);
    queue.complete(&payload).await.expect("Failed to ack job");

    println!("Integration test passed");
}

#[tokio::test]
#[ignore]
async fn test_retention_sweep_against_postgres() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(config.require_database_url().expect("DATABASE_URL"))
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    let store = PostgresJobStore::new(pool);

    let finished = Job::new_pending(Uuid::new_v4());
    store.insert(&finished).await.unwrap();
    store
        .update(finished.id, JobState::Error { message: "boom".to_string() })
        .await
        .unwrap();

    let running = Job::new_pending(Uuid::new_v4());
    store.insert(&running).await.unwrap();
    store.mark_processing(running.id).await.unwrap();

    // Queued behind a busy worker; must survive the sweep.
    let waiting = Job::new_pending(Uuid::new_v4());
    store.insert(&waiting).await.unwrap();

    let later = chrono::Utc::now() + chrono::Duration::seconds(5);
    let keep_finished = RetentionPolicy {
        retention: Duration::from_secs(3600),
        stale_after: Duration::ZERO,
        interval: Duration::from_secs(60),
    };
    let report = retention::sweep(&store, &keep_finished, later).await.unwrap();
    assert!(report.failed_stale >= 1);

    let stale = store.get(running.id).await.unwrap();
    assert_eq!(stale.status(), JobStatus::Error);
    assert_eq!(
        stale.error_message(),
        Some(card_faceswap::services::faceswap::TIMEOUT_MESSAGE)
    );
    assert_eq!(store.get(finished.id).await.unwrap().status(), JobStatus::Error);
    assert_eq!(store.get(waiting.id).await.unwrap().status(), JobStatus::Pending);

    let drop_finished = RetentionPolicy {
        retention: Duration::ZERO,
        ..keep_finished
    };
    let report = retention::sweep(&store, &drop_finished, later).await.unwrap();
    assert!(report.evicted >= 2);

    for id in [finished.id, running.id] {
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
    }
}

#[tokio::test]
#[ignore]
async fn test_orphaned_processing_entries_are_reclaimed() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(config.require_database_url().expect("DATABASE_URL"))
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    let store = PostgresJobStore::new(pool);
    let queue = JobQueue::new(config.redis_url.as_deref().expect("REDIS_URL"))
        .expect("Failed to initialize queue");

    let finished = Job::new_pending(Uuid::new_v4());
    let running = Job::new_pending(Uuid::new_v4());
    for job in [&finished, &running] {
        store.insert(job).await.unwrap();
        queue
            .enqueue(&QueuedJob::from(&GenerationTask {
                job_id: job.id,
                source_image: vec![1, 2, 3],
                target_image_url: "https://example/target.png".to_string(),
            }))
            .await
            .unwrap();
    }

    // Two workers take a job each, then die without acking.
    let mut taken = Vec::new();
    while taken.len() < 2 {
        let (payload, queued) = queue.dequeue().await.unwrap().expect("queued job");
        if queued.job_id == finished.id || queued.job_id == running.id {
            taken.push((payload, queued.job_id));
        } else {
            queue.complete(&payload).await.unwrap();
        }
    }
    store.mark_processing(running.id).await.unwrap();
    store
        .update(finished.id, JobState::Error { message: "boom".to_string() })
        .await
        .unwrap();

    let reclaimed = queue.reclaim_finished(&store).await.unwrap();
    assert!(reclaimed >= 1);

    // The running job's entry is still there to ack.
    let (running_payload, _) = taken
        .into_iter()
        .find(|(_, id)| *id == running.id)
        .unwrap();
    queue.complete(&running_payload).await.unwrap();
}
