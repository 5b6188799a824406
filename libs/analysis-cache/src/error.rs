//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lookup miss. Distinct from `Redis`/`Serialization` so callers can
    /// tell "not cached" apart from "cache infrastructure is broken".
    #[error("Cache miss")]
    NotFound,
}

pub type CacheResult<T> = Result<T, CacheError>;
