//! Persistence for outbox events, including the CAS claim used by the
//! publisher loop.
//!
//! All mutations go through `lock_version`: a writer reads a row, then
//! updates it conditioned on the `lock_version` it read, incrementing the
//! column in the same statement. A zero-row update means someone else moved
//! the row first, surfaced as `OutboxError::LostClaim` rather than silently
//! ignored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{OutboxError, OutboxResult};
use crate::model::{NewOutboxEvent, OutboxEvent};

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new event inside the caller's transaction, alongside
    /// whatever business row that transaction is already writing.
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> OutboxResult<OutboxEvent>;

    /// `status = pending` events due for a first publish attempt, highest
    /// priority first, oldest first within a priority.
    async fn fetch_pending_due(&self, limit: i64) -> OutboxResult<Vec<OutboxEvent>>;

    /// `status = failed` events whose backoff has elapsed and whose retry
    /// budget isn't exhausted, in the same priority/age order.
    async fn fetch_retry_due(&self, limit: i64) -> OutboxResult<Vec<OutboxEvent>>;

    /// Atomically move `pending`/`failed` -> `processing`. Fails with
    /// `LostClaim` if `lock_version` no longer matches.
    async fn claim(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent>;

    async fn mark_published(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent>;

    async fn mark_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> OutboxResult<OutboxEvent>;

    async fn mark_permanently_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: &str,
    ) -> OutboxResult<OutboxEvent>;

    /// The worker has picked up a published event and started acting on it.
    async fn mark_processed(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent>;

    /// The worker finished acting on the event; terminal success state.
    async fn mark_completed(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent>;

    async fn find_latest_for_aggregate(
        &self,
        aggregate_id: Uuid,
    ) -> OutboxResult<Option<OutboxEvent>>;
}

pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            INSERT INTO outbox_events (
                id, aggregate_id, aggregate_type, event_type, priority, status,
                retry_count, max_retries, payload, created_at, lock_version
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7, now(), 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.aggregate_id)
        .bind(event.aggregate_type)
        .bind(event.event_type)
        .bind(event.priority)
        .bind(event.max_retries)
        .bind(event.payload)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn fetch_pending_due(&self, limit: i64) -> OutboxResult<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'pending'
            ORDER BY
                CASE priority
                    WHEN 'urgent' THEN 0
                    WHEN 'high' THEN 1
                    WHEN 'normal' THEN 2
                    WHEN 'low' THEN 3
                END,
                created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn fetch_retry_due(&self, limit: i64) -> OutboxResult<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'failed'
              AND next_retry_at <= now()
              AND retry_count < max_retries
            ORDER BY
                CASE priority
                    WHEN 'urgent' THEN 0
                    WHEN 'high' THEN 1
                    WHEN 'normal' THEN 2
                    WHEN 'low' THEN 3
                END,
                created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn claim(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'processing', started_at = now(), lock_version = lock_version + 1
            WHERE id = $1 AND status IN ('pending', 'failed') AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn mark_published(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'published', published_at = now(), lock_version = lock_version + 1
            WHERE id = $1 AND status = 'processing' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'failed',
                retry_count = retry_count + 1,
                error_details = $3,
                next_retry_at = $4,
                lock_version = lock_version + 1
            WHERE id = $1 AND status = 'processing' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .bind(error)
        .bind(next_retry_at)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn mark_permanently_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: &str,
    ) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'permanently_failed',
                error_details = $3,
                next_retry_at = NULL,
                lock_version = lock_version + 1
            WHERE id = $1 AND status = 'processing' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn mark_processed(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'processed', processed_at = now(), lock_version = lock_version + 1
            WHERE id = $1 AND status = 'published' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn mark_completed(&self, id: Uuid, lock_version: i32) -> OutboxResult<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'completed', completed_at = now(), lock_version = lock_version + 1
            WHERE id = $1 AND status = 'processed' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(OutboxError::LostClaim { id })
    }

    async fn find_latest_for_aggregate(
        &self,
        aggregate_id: Uuid,
    ) -> OutboxResult<Option<OutboxEvent>> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT * FROM outbox_events
            WHERE aggregate_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
