//! Properties of the outbox claim/retry machinery against a real Postgres,
//! with a scripted fake publisher standing in for the broker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use transactional_outbox::{
    BackoffConfig, BackoffStrategy, NewOutboxEvent, OutboxError, OutboxEvent, OutboxProcessor,
    OutboxPublisher, OutboxRepository, OutboxResult, OutboxStatus, Priority, ProcessorConfig,
    SqlxOutboxRepository,
};

/// Fails its first `fail_times` publishes for a given event, then succeeds.
struct FlakyPublisher {
    fail_times: usize,
    attempts: std::sync::Mutex<std::collections::HashMap<uuid::Uuid, usize>>,
}

impl FlakyPublisher {
    fn new(fail_times: usize) -> Self {
        Self {
            fail_times,
            attempts: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl OutboxPublisher for FlakyPublisher {
    async fn publish(&self, event: &OutboxEvent) -> OutboxResult<()> {
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(event.id).or_insert(0);
        *count += 1;
        if *count <= self.fail_times {
            Err(OutboxError::Broker("simulated publish failure".to_string()))
        } else {
            Ok(())
        }
    }
}

struct AlwaysFailsPublisher;

#[async_trait]
impl OutboxPublisher for AlwaysFailsPublisher {
    async fn publish(&self, _event: &OutboxEvent) -> OutboxResult<()> {
        Err(OutboxError::Broker("simulated publish failure".to_string()))
    }
}

async fn insert_event(repo: &SqlxOutboxRepository, pool: &sqlx::PgPool, max_retries: i32) -> uuid::Uuid {
    let aggregate_id = uuid::Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    let event = repo
        .insert(
            &mut tx,
            NewOutboxEvent {
                aggregate_id,
                aggregate_type: "analysis".to_string(),
                event_type: "analysis.requested".to_string(),
                priority: Priority::Normal,
                max_retries,
                payload: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    event.id
}

/// Property 3: at most one claimant wins a race on the same event; every
/// other concurrent claim attempt observes `LostClaim`.
#[tokio::test]
async fn only_one_concurrent_claim_succeeds() {
    let env = common::setup().await;
    let repo = Arc::new(SqlxOutboxRepository::new(env.pool.clone()));
    let event_id = insert_event(&repo, &env.pool, 3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move { repo.claim(event_id, 0).await }));
    }

    let mut successes = 0;
    let mut lost_claims = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(OutboxError::LostClaim { .. }) => lost_claims += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one claim should win the race");
    assert_eq!(lost_claims, 7);
}

/// Property 4: the event's timestamp sequence never decreases.
#[tokio::test]
async fn timestamps_advance_monotonically_through_the_happy_path() {
    let env = common::setup().await;
    let repo = SqlxOutboxRepository::new(env.pool.clone());
    let event_id = insert_event(&repo, &env.pool, 3).await;

    let claimed = repo.claim(event_id, 0).await.unwrap();
    assert!(claimed.started_at.unwrap() >= claimed.created_at);

    let published = repo
        .mark_published(claimed.id, claimed.lock_version)
        .await
        .unwrap();
    assert!(published.published_at.unwrap() >= published.started_at.unwrap());

    let processed = repo
        .mark_processed(published.id, published.lock_version)
        .await
        .unwrap();
    assert!(processed.processed_at.unwrap() >= processed.published_at.unwrap());

    let completed = repo
        .mark_completed(processed.id, processed.lock_version)
        .await
        .unwrap();
    assert!(completed.completed_at.unwrap() >= completed.processed_at.unwrap());
}

/// S4: a publish failure retries with a future `next_retry_at`, and the
/// next drain tick picks it back up and publishes successfully.
#[tokio::test]
async fn failed_publish_retries_then_succeeds() {
    let env = common::setup().await;
    let repo: Arc<dyn OutboxRepository> = Arc::new(SqlxOutboxRepository::new(env.pool.clone()));
    let sqlx_repo = SqlxOutboxRepository::new(env.pool.clone());
    let event_id = insert_event(&sqlx_repo, &env.pool, 3).await;

    let publisher: Arc<dyn OutboxPublisher> = Arc::new(FlakyPublisher::new(1));
    let backoff = Arc::new(BackoffStrategy::new(
        BackoffConfig::default(),
        StdRng::seed_from_u64(1),
    ));
    let processor = OutboxProcessor::new(
        repo.clone(),
        publisher,
        backoff,
        ProcessorConfig {
            tick_interval: Duration::from_secs(2),
            batch_size: 10,
        },
    );

    processor.drain_once().await.unwrap();

    let failed = fetch_by_id(&env.pool, event_id).await;
    assert_eq!(failed.status, OutboxStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert!(failed.next_retry_at.is_some());

    // Force the retry to be due immediately, then drain again.
    sqlx::query("UPDATE outbox_events SET next_retry_at = now() - interval '1 second' WHERE id = $1")
        .bind(event_id)
        .execute(&env.pool)
        .await
        .unwrap();

    processor.drain_once().await.unwrap();

    let published = fetch_by_id(&env.pool, event_id).await;
    assert_eq!(published.status, OutboxStatus::Published);
}

/// S5: once `retry_count` reaches `max_retries`, the event goes permanently
/// failed with `next_retry_at = null` (property 5: `retry_count <=
/// max_retries` always holds, and `permanently_failed` occurs only at the
/// limit).
#[tokio::test]
async fn retries_exhausted_goes_permanently_failed() {
    let env = common::setup().await;
    let repo: Arc<dyn OutboxRepository> = Arc::new(SqlxOutboxRepository::new(env.pool.clone()));
    let sqlx_repo = SqlxOutboxRepository::new(env.pool.clone());
    let event_id = insert_event(&sqlx_repo, &env.pool, 2).await;

    let publisher: Arc<dyn OutboxPublisher> = Arc::new(AlwaysFailsPublisher);
    let backoff = Arc::new(BackoffStrategy::new(
        BackoffConfig::default(),
        StdRng::seed_from_u64(2),
    ));
    let processor = OutboxProcessor::new(
        repo.clone(),
        publisher,
        backoff,
        ProcessorConfig {
            tick_interval: Duration::from_secs(2),
            batch_size: 10,
        },
    );

    for _ in 0..3 {
        processor.drain_once().await.unwrap();

        let row = fetch_by_id(&env.pool, event_id).await;
        assert!(row.retry_count <= row.max_retries);

        if row.status == OutboxStatus::Failed {
            sqlx::query(
                "UPDATE outbox_events SET next_retry_at = now() - interval '1 second' WHERE id = $1",
            )
            .bind(event_id)
            .execute(&env.pool)
            .await
            .unwrap();
        }
    }

    let final_row = fetch_by_id(&env.pool, event_id).await;
    assert_eq!(final_row.status, OutboxStatus::PermanentlyFailed);
    assert_eq!(final_row.retry_count, 2);
    assert!(final_row.next_retry_at.is_none());
}

async fn fetch_by_id(pool: &sqlx::PgPool, id: uuid::Uuid) -> OutboxEvent {
    sqlx::query_as::<_, OutboxEvent>("SELECT * FROM outbox_events WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}
