//! Application error type for the HTTP surface of the service.
//!
//! Wraps `error_types::DomainError` so every failure the API returns carries
//! the same `{code, message, status_code, details}` shape used on a failed
//! `Analysis` row.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use error_types::{DomainError, ErrorCode};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub DomainError);

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self(DomainError::new(code, message))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.0
            .status_code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(match self.0.code {
                ErrorCode::TransactionError
                | ErrorCode::OutboxError
                | ErrorCode::StatusUpdateError
                | ErrorCode::DuplicateCheckError
                | ErrorCode::AnalysisError
                | ErrorCode::CopyResultsError
                | ErrorCode::DurationUpdateError => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::FetchError => StatusCode::BAD_GATEWAY,
                ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
                ErrorCode::MaxRetriesExceeded => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::OptimisticLockFailed => StatusCode::CONFLICT,
            })
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(&self.0)
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self(DomainError::new(ErrorCode::TransactionError, err.to_string()))
    }
}

impl From<transactional_outbox::OutboxError> for AppError {
    fn from(err: transactional_outbox::OutboxError) -> Self {
        Self(DomainError::new(ErrorCode::OutboxError, err.to_string()))
    }
}

impl From<analysis_cache::CacheError> for AppError {
    fn from(err: analysis_cache::CacheError) -> Self {
        Self(DomainError::new(ErrorCode::StatusUpdateError, err.to_string()))
    }
}
