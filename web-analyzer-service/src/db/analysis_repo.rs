//! Persistence for `Analysis` rows, including the `lock_version` CAS used by
//! every status transition after submission.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Analysis;

#[derive(Debug, Error)]
pub enum AnalysisRepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("analysis {id} was updated by another writer before this update committed")]
    LockConflict { id: Uuid },
}

pub type AnalysisRepoResult<T> = Result<T, AnalysisRepoError>;

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn insert(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid, url: &str)
        -> AnalysisRepoResult<Analysis>;

    async fn find_by_id(&self, id: Uuid) -> AnalysisRepoResult<Option<Analysis>>;

    /// Most recent *completed* analysis sharing this content hash, used by
    /// the worker's dedup step.
    async fn find_completed_by_content_hash(
        &self,
        content_hash: &str,
    ) -> AnalysisRepoResult<Option<Analysis>>;

    async fn mark_in_progress(&self, id: Uuid, lock_version: i32) -> AnalysisRepoResult<Analysis>;

    async fn mark_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: serde_json::Value,
    ) -> AnalysisRepoResult<Analysis>;

    #[allow(clippy::too_many_arguments)]
    async fn mark_completed(
        &self,
        id: Uuid,
        lock_version: i32,
        content_hash: &str,
        content_size: i64,
        results: serde_json::Value,
        completion_duration_ms: i64,
    ) -> AnalysisRepoResult<Analysis>;
}

pub struct SqlxAnalysisRepository {
    pool: PgPool,
}

impl SqlxAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisRepository for SqlxAnalysisRepository {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        url: &str,
    ) -> AnalysisRepoResult<Analysis> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            INSERT INTO analyses (id, url, status, created_at, lock_version)
            VALUES ($1, $2, 'requested', now(), 0)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(url)
        .fetch_one(&mut **tx)
        .await?;

        Ok(analysis)
    }

    async fn find_by_id(&self, id: Uuid) -> AnalysisRepoResult<Option<Analysis>> {
        let analysis = sqlx::query_as::<_, Analysis>("SELECT * FROM analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(analysis)
    }

    async fn find_completed_by_content_hash(
        &self,
        content_hash: &str,
    ) -> AnalysisRepoResult<Option<Analysis>> {
        let analysis = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT * FROM analyses
            WHERE content_hash = $1 AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(analysis)
    }

    async fn mark_in_progress(&self, id: Uuid, lock_version: i32) -> AnalysisRepoResult<Analysis> {
        let row = sqlx::query_as::<_, Analysis>(
            r#"
            UPDATE analyses
            SET status = 'in_progress', lock_version = lock_version + 1
            WHERE id = $1 AND status = 'requested' AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AnalysisRepoError::LockConflict { id })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        lock_version: i32,
        error: serde_json::Value,
    ) -> AnalysisRepoResult<Analysis> {
        let row = sqlx::query_as::<_, Analysis>(
            r#"
            UPDATE analyses
            SET status = 'failed', error = $3, completed_at = now(), lock_version = lock_version + 1
            WHERE id = $1 AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AnalysisRepoError::LockConflict { id })
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        lock_version: i32,
        content_hash: &str,
        content_size: i64,
        results: serde_json::Value,
        completion_duration_ms: i64,
    ) -> AnalysisRepoResult<Analysis> {
        let row = sqlx::query_as::<_, Analysis>(
            r#"
            UPDATE analyses
            SET status = 'completed',
                content_hash = $3,
                content_size = $4,
                results = $5,
                completed_at = now(),
                completion_duration_ms = $6,
                lock_version = lock_version + 1
            WHERE id = $1 AND lock_version = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(lock_version)
        .bind(content_hash)
        .bind(content_size)
        .bind(results)
        .bind(completion_duration_ms)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AnalysisRepoError::LockConflict { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_conflict_names_the_analysis_id() {
        let id = Uuid::new_v4();
        let err = AnalysisRepoError::LockConflict { id };
        assert!(err.to_string().contains(&id.to_string()));
    }
}
