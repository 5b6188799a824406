//! `StartAnalysis`: atomic co-write of an `Analysis` and its initial
//! `OutboxEvent`, then a best-effort cache fill outside the transaction.

use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use error_types::ErrorCode;
use transactional_outbox::{event_type, NewOutboxEvent, OutboxRepository};

use crate::cache::{self, SharedAnalysisCache};
use crate::db::AnalysisRepository;
use crate::error::{AppError, Result};
use crate::models::{Analysis, AnalysisOptions, AnalysisRequestPayload, EventPriority};

pub struct SubmissionService {
    pool: PgPool,
    analysis_repo: Arc<dyn AnalysisRepository>,
    outbox_repo: Arc<dyn OutboxRepository>,
    cache: Arc<SharedAnalysisCache>,
    max_retries_by_priority: HashMap<String, i32>,
}

impl SubmissionService {
    pub fn new(
        pool: PgPool,
        analysis_repo: Arc<dyn AnalysisRepository>,
        outbox_repo: Arc<dyn OutboxRepository>,
        cache: Arc<SharedAnalysisCache>,
        max_retries_by_priority: HashMap<String, i32>,
    ) -> Self {
        Self {
            pool,
            analysis_repo,
            outbox_repo,
            cache,
            max_retries_by_priority,
        }
    }

    pub async fn start_analysis(&self, url: String, options: AnalysisOptions) -> Result<Analysis> {
        let id = Uuid::new_v4();
        let priority = EventPriority::Normal;
        let max_retries = *self
            .max_retries_by_priority
            .get("normal")
            .unwrap_or(&3);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::new(ErrorCode::TransactionError, e.to_string()))?;

        let analysis = self
            .analysis_repo
            .insert(&mut tx, id, &url)
            .await
            .map_err(|e| AppError::new(ErrorCode::TransactionError, e.to_string()))?;

        let payload = AnalysisRequestPayload {
            analysis_id: id,
            url,
            options,
            priority,
            created_at: Utc::now(),
        };
        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| AppError::new(ErrorCode::TransactionError, e.to_string()))?;

        self.outbox_repo
            .insert(
                &mut tx,
                NewOutboxEvent {
                    aggregate_id: id,
                    aggregate_type: "analysis".to_string(),
                    event_type: event_type::ANALYSIS_REQUESTED.to_string(),
                    priority: priority.into(),
                    max_retries,
                    payload: payload_json,
                },
            )
            .await
            .map_err(|e| AppError::new(ErrorCode::TransactionError, e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::new(ErrorCode::TransactionError, e.to_string()))?;

        cache::set_best_effort(&self.cache, &analysis).await;

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(EventPriority::default(), EventPriority::Normal);
    }
}
