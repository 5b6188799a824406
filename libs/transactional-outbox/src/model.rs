//! Outbox event model and its state machine.
//!
//! ```text
//! pending ──claim──▶ processing ──publish ok──▶ published ──worker starts──▶ processed ──▶ completed
//!                          │                                    │
//!                          └── publish fails ──▶ failed ────────┘
//!                                                  │
//!                                         retry-ready? ──▶ pending'
//!                                         retries exhausted ──▶ permanently_failed
//! ```
//! `completed`, `failed`-with-no-more-retries (`permanently_failed`) are the
//! only terminal states; `failed` itself is transient whenever `retry_count
//! < max_retries`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Ordering used by the pending drain: `urgent > high > normal > low`.
    /// Expressed as a rank so `ORDER BY` can sort ascending on it.
    pub fn rank(self) -> i16 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Published,
    Processed,
    Completed,
    Failed,
    PermanentlyFailed,
}

impl OutboxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OutboxStatus::Completed | OutboxStatus::PermanentlyFailed)
    }
}

/// A durable record of a domain event awaiting delivery to the broker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub priority: Priority,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub payload: serde_json::Value,
    pub error_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub lock_version: i32,
}

impl OutboxEvent {
    /// True once `retry_count` has reached the configured ceiling — the
    /// publisher must stop retrying and transition to `permanently_failed`.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Event types this service emits. `analysis.retry` is reserved for a
/// future re-submission path; the core only ever creates `analysis.requested`
/// events today.
pub mod event_type {
    pub const ANALYSIS_REQUESTED: &str = "analysis.requested";
    pub const ANALYSIS_RETRY: &str = "analysis.retry";
}

/// Fields required to insert a new outbox event inside the caller's
/// transaction. `id`, `status`, `retry_count`, `lock_version`, and the
/// timestamp columns are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub priority: Priority,
    pub max_retries: i32,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_orders_urgent_first() {
        let mut priorities = vec![Priority::Low, Priority::Urgent, Priority::Normal, Priority::High];
        priorities.sort_by_key(|p| p.rank());
        assert_eq!(
            priorities,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
    }

    #[test]
    fn completed_and_permanently_failed_are_terminal() {
        assert!(OutboxStatus::Completed.is_terminal());
        assert!(OutboxStatus::PermanentlyFailed.is_terminal());
        assert!(!OutboxStatus::Failed.is_terminal());
        assert!(!OutboxStatus::Pending.is_terminal());
    }
}
