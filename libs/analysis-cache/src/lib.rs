//! Keyed snapshot cache for `Analysis` rows.
//!
//! Implements the cache adapter's `Find`/`Set`/`Delete` contract: the store
//! is the single authoritative owner of an analysis, this cache holds a
//! best-effort, stale-tolerant derived snapshot keyed by analysis id. `Find`
//! distinguishes a miss (`CacheError::NotFound`) from an infrastructure
//! failure; `Set` and `Delete` are meant to be called from a context that
//! logs-and-ignores failures rather than propagating them as user-facing
//! errors.

mod error;
mod keys;
mod metrics;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use metrics::CacheMetrics;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Default TTL for a cached analysis snapshot.
pub const ANALYSIS_TTL_SECS: u64 = 3600;

/// Analysis snapshot cache.
///
/// Generic over the snapshot type so that the entity definition stays in
/// the service crate rather than being duplicated here; any `T` the caller
/// chooses to serialize as the cached `Analysis` representation works.
#[derive(Clone)]
pub struct AnalysisCache<T> {
    redis: SharedRedis,
    metrics: CacheMetrics,
    ttl_secs: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AnalysisCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(redis: SharedRedis) -> Self {
        Self::with_ttl(redis, ANALYSIS_TTL_SECS)
    }

    pub fn with_ttl(redis: SharedRedis, ttl_secs: u64) -> Self {
        Self {
            redis,
            metrics: CacheMetrics::new(),
            ttl_secs,
            _marker: PhantomData,
        }
    }

    /// Add up to 10% jitter to the TTL to avoid synchronized expiry.
    fn jittered_ttl(&self) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (self.ttl_secs as f64 * jitter_percent).round() as u64;
        self.ttl_secs + jitter
    }

    /// `Find(id)`: a snapshot, or `CacheError::NotFound` on a miss.
    pub async fn find(&self, id: Uuid) -> CacheResult<T> {
        let key = CacheKey::analysis(id);
        let mut conn = self.redis.lock().await;

        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(data)) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    debug!(key = %key, "analysis cache hit");
                    self.metrics.record_hit("analysis");
                    Ok(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "analysis cache deserialization failed");
                    self.metrics.record_error("analysis", "deserialize");
                    let _ = conn.del::<_, ()>(&key).await;
                    Err(CacheError::NotFound)
                }
            },
            Ok(None) => {
                debug!(key = %key, "analysis cache miss");
                self.metrics.record_miss("analysis");
                Err(CacheError::NotFound)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "redis get error");
                self.metrics.record_error("analysis", "redis");
                Err(CacheError::Redis(e))
            }
        }
    }

    /// `Set(analysis)`: write-through. Callers treat failures as best-effort.
    pub async fn set(&self, id: Uuid, value: &T) -> CacheResult<()> {
        let key = CacheKey::analysis(id);
        let data = serde_json::to_string(value)?;
        let ttl = self.jittered_ttl();

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(&key, data, ttl).await?;

        debug!(key = %key, ttl, "analysis cache set");
        self.metrics.record_write("analysis");
        Ok(())
    }

    /// `Delete(id)`: invalidate. Callers treat failures as best-effort.
    pub async fn delete(&self, id: Uuid) -> CacheResult<()> {
        let key = CacheKey::analysis(id);
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(&key).await?;

        debug!(key = %key, "analysis cache delete");
        self.metrics.record_invalidation("analysis");
        Ok(())
    }
}

/// Build a `SharedRedis` from a connection URL.
pub async fn connect(redis_url: &str) -> redis::RedisResult<SharedRedis> {
    let client = redis::Client::open(redis_url)?;
    let manager = client.get_connection_manager().await?;
    Ok(Arc::new(Mutex::new(manager)))
}

/// Jitter bound used in tests; exposed so the service's own tests can assert
/// against the same tolerance without duplicating the constant.
pub const JITTER_MAX_FRACTION: f64 = 0.10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_cache_key_is_versioned() {
        let id = Uuid::new_v4();
        let key = CacheKey::analysis(id);
        assert!(key.starts_with(&format!("v{}:analysis:", CACHE_VERSION)));
    }
}
