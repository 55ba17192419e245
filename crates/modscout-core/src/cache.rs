//! Bounded cache for pinned resolutions.
//!
//! Keys are [`PinnedKey`]s, so only results for requests that arrived with an
//! explicit version can be stored. Entries expire after a TTL and the least
//! recently used entry is evicted at capacity. The lock is never held across
//! an `.await`.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use modscout_config::CacheConfig;
use tracing::trace;

use crate::reference::PinnedKey;

pub struct ResolutionCache<V> {
    entries: Mutex<LruCache<PinnedKey, (Instant, V)>>,
    ttl: Duration,
}

impl<V: Clone> ResolutionCache<V> {
    /// `None` when `capacity` is zero.
    pub fn new(capacity: usize, ttl: Duration) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        })
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Self::new(config.capacity, Duration::from_secs(config.ttl_secs))
    }

    pub fn get(&self, key: &PinnedKey) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let found = entries
            .get(key)
            .map(|(stored_at, value)| (stored_at.elapsed() < self.ttl, value.clone()));
        match found {
            Some((true, value)) => {
                trace!(%key, "Cache hit");
                Some(value)
            }
            Some((false, _)) => {
                entries.pop(key);
                trace!(%key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: PinnedKey, value: V) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ModuleReference;
    use pretty_assertions::assert_eq;

    fn key(id: &str) -> PinnedKey {
        ModuleReference::parse(id).unwrap().pinned_key().unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let cache = ResolutionCache::new(4, Duration::from_secs(60)).unwrap();
        cache.put(key("ns/vpc/ibm/1.0.0"), "v1".to_string());
        assert_eq!(cache.get(&key("ns/vpc/ibm/1.0.0")), Some("v1".to_string()));
        assert_eq!(cache.get(&key("ns/vpc/ibm/2.0.0")), None);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = ResolutionCache::new(2, Duration::from_secs(60)).unwrap();
        cache.put(key("ns/a/ibm/1.0.0"), 1);
        cache.put(key("ns/b/ibm/1.0.0"), 2);
        assert_eq!(cache.get(&key("ns/a/ibm/1.0.0")), Some(1));
        cache.put(key("ns/c/ibm/1.0.0"), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("ns/b/ibm/1.0.0")), None);
        assert_eq!(cache.get(&key("ns/a/ibm/1.0.0")), Some(1));
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ResolutionCache::new(2, Duration::ZERO).unwrap();
        cache.put(key("ns/a/ibm/1.0.0"), 1);
        assert_eq!(cache.get(&key("ns/a/ibm/1.0.0")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache() {
        assert!(ResolutionCache::<u8>::new(0, Duration::from_secs(1)).is_none());
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(ResolutionCache::<u8>::from_config(&config).is_none());
        assert!(ResolutionCache::<u8>::from_config(&CacheConfig::default()).is_some());
    }

    #[test]
    fn test_latest_reference_has_no_key() {
        assert!(ModuleReference::parse("ns/vpc/ibm").unwrap().pinned_key().is_none());
    }
}
