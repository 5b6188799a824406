//! Shared domain error codes for the analysis pipeline.
//!
//! Every service-level error eventually collapses into one of these codes so
//! that the `error` column on an `Analysis` row and the log lines emitted
//! around it stay consistent across the submission service, the publisher
//! loop, and the worker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain-level error codes, not Rust types: several distinct Rust error
/// enums across the workspace map onto the same code here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TransactionError,
    OutboxError,
    StatusUpdateError,
    FetchError,
    DuplicateCheckError,
    AnalysisError,
    CopyResultsError,
    DurationUpdateError,
    InvalidStateTransition,
    MaxRetriesExceeded,
    OptimisticLockFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::TransactionError => "TRANSACTION_ERROR",
            ErrorCode::OutboxError => "OUTBOX_ERROR",
            ErrorCode::StatusUpdateError => "STATUS_UPDATE_ERROR",
            ErrorCode::FetchError => "FETCH_ERROR",
            ErrorCode::DuplicateCheckError => "DUPLICATE_CHECK_ERROR",
            ErrorCode::AnalysisError => "ANALYSIS_ERROR",
            ErrorCode::CopyResultsError => "COPY_RESULTS_ERROR",
            ErrorCode::DurationUpdateError => "DURATION_UPDATE_ERROR",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorCode::OptimisticLockFailed => "OPTIMISTIC_LOCK_FAILED",
        };
        f.write_str(s)
    }
}

/// The `error` column persisted on a failed `Analysis` row.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status_code: None,
            details: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// True for errors the worker must report to the broker as `requeue`
    /// (infrastructure failures), false for logical failures that should be
    /// acked because they are durably recorded on the analysis row.
    pub fn is_infrastructural(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::OutboxError
                | ErrorCode::StatusUpdateError
                | ErrorCode::DuplicateCheckError
                | ErrorCode::AnalysisError
                | ErrorCode::CopyResultsError
                | ErrorCode::DurationUpdateError
                | ErrorCode::TransactionError
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::new(ErrorCode::TransactionError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_code() {
        let err = DomainError::new(ErrorCode::FetchError, "dial tcp: i/o timeout");
        assert_eq!(err.code.to_string(), "FETCH_ERROR");
    }

    #[test]
    fn fetch_error_is_not_infrastructural() {
        let err = DomainError::new(ErrorCode::FetchError, "boom");
        assert!(!err.is_infrastructural());
    }

    #[test]
    fn outbox_error_is_infrastructural() {
        let err = DomainError::new(ErrorCode::OutboxError, "boom");
        assert!(err.is_infrastructural());
    }

    #[test]
    fn serializes_with_screaming_snake_case_code() {
        let err = DomainError::new(ErrorCode::OptimisticLockFailed, "stale version");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "OPTIMISTIC_LOCK_FAILED");
    }
}
