//! Cache wiring: an `AnalysisCache<Analysis>` plus the best-effort
//! log-and-ignore helpers submission and the worker call it through.

use analysis_cache::AnalysisCache;
use tracing::warn;
use uuid::Uuid;

use crate::models::Analysis;

pub type SharedAnalysisCache = AnalysisCache<Analysis>;

/// `Set`, logging and swallowing any failure — callers never propagate a
/// cache write failure as a user-facing error.
pub async fn set_best_effort(cache: &SharedAnalysisCache, analysis: &Analysis) {
    if let Err(e) = cache.set(analysis.id, analysis).await {
        warn!(analysis_id = %analysis.id, error = %e, "best-effort cache write failed");
    }
}

/// `Delete`, logging and swallowing any failure.
pub async fn invalidate_best_effort(cache: &SharedAnalysisCache, id: Uuid) {
    if let Err(e) = cache.delete(id).await {
        warn!(analysis_id = %id, error = %e, "best-effort cache invalidation failed");
    }
}
