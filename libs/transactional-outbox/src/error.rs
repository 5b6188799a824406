use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("event {id} was claimed by another worker before this update committed")]
    LostClaim { id: uuid::Uuid },

    #[error("event {id} has exhausted its retry budget ({retries}/{max})")]
    RetriesExhausted {
        id: uuid::Uuid,
        retries: i32,
        max: i32,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OutboxResult<T> = Result<T, OutboxError>;
