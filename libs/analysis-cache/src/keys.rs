//! Cache key schema
//!
//! Key format: v{VERSION}:{entity}:{identifier}

use uuid::Uuid;

pub const CACHE_VERSION: u32 = 1;

pub struct CacheKey;

impl CacheKey {
    /// Analysis snapshot cache.
    /// Format: v1:analysis:{analysis_id}
    pub fn analysis(analysis_id: Uuid) -> String {
        format!("v{}:analysis:{}", CACHE_VERSION, analysis_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_key_format() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            CacheKey::analysis(id),
            "v1:analysis:550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
