use crate::config::{PathCacheConfig, PathConfig};
use moka::future::Cache as MokaCache;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry {
    /// `None` records that the path deliberately has no configuration
    value: Option<PathConfig>,
    created_at: Instant,
    lifespan: Option<Duration>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.lifespan
            .map(|lifespan| self.created_at.elapsed() >= lifespan)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(PathConfig),
    Negative,
    Expired,
    Miss,
}

/// Resolved path configurations keyed by request path.
///
/// Entries expire lazily: an expired entry is removed by the read that finds it.
#[derive(Clone)]
pub struct PathCache {
    entries: Option<MokaCache<String, Arc<CacheEntry>>>,
    lifespan: Option<Duration>,
}

impl PathCache {
    pub fn new(config: &PathCacheConfig) -> Self {
        if config.lifespan == 0 {
            return Self {
                entries: None,
                lifespan: None,
            };
        }

        let lifespan = u64::try_from(config.lifespan)
            .ok()
            .map(Duration::from_millis);
        let entries = MokaCache::builder()
            .max_capacity(config.max_entries)
            .build();

        Self {
            entries: Some(entries),
            lifespan,
        }
    }

    /// Look up `path`, returning an independent copy of a cached config.
    pub async fn get(&self, path: &str) -> CacheLookup {
        let Some(entries) = &self.entries else {
            return CacheLookup::Miss;
        };
        let Some(entry) = entries.get(path).await else {
            return CacheLookup::Miss;
        };

        if entry.is_expired() {
            entries.invalidate(path).await;
            return CacheLookup::Expired;
        }

        match &entry.value {
            Some(config) => CacheLookup::Hit(config.clone()),
            None => CacheLookup::Negative,
        }
    }

    pub async fn put(&self, path: &str, value: Option<PathConfig>) {
        if let Some(entries) = &self.entries {
            let entry = CacheEntry {
                value,
                created_at: Instant::now(),
                lifespan: self.lifespan,
            };
            entries.insert(path.to_string(), Arc::new(entry)).await;
        }
    }

    pub async fn remove(&self, path: &str) {
        if let Some(entries) = &self.entries {
            entries.invalidate(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &str) -> PathConfig {
        PathConfig {
            id: Some("r1".to_string()),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hit_negative_and_miss() {
        let cache = PathCache::new(&PathCacheConfig::default());
        cache.put("/a", Some(config("/a"))).await;
        cache.put("/b", None).await;

        assert!(matches!(cache.get("/a").await, CacheLookup::Hit(c) if c.path == "/a"));
        assert_eq!(cache.get("/b").await, CacheLookup::Negative);
        assert_eq!(cache.get("/c").await, CacheLookup::Miss);

        cache.remove("/a").await;
        assert_eq!(cache.get("/a").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_entries_expire_lazily() {
        let cache = PathCache::new(&PathCacheConfig {
            max_entries: 10,
            lifespan: 20,
        });
        cache.put("/a", Some(config("/a"))).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("/a").await, CacheLookup::Expired);
        assert_eq!(cache.get("/a").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_negative_lifespan_never_expires() {
        let cache = PathCache::new(&PathCacheConfig {
            max_entries: 10,
            lifespan: -1,
        });
        cache.put("/a", Some(config("/a"))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(cache.get("/a").await, CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn test_zero_lifespan_disables_cache() {
        let cache = PathCache::new(&PathCacheConfig {
            max_entries: 10,
            lifespan: 0,
        });
        cache.put("/a", Some(config("/a"))).await;
        assert_eq!(cache.get("/a").await, CacheLookup::Miss);
    }
}
