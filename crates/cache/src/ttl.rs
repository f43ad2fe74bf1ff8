//! TTL cache implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use agrochain_core::Invalidate;

/// Cache limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub max_size: usize,
    /// Age past which an entry is treated as absent.
    pub expiration: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            expiration: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
}

#[derive(Debug)]
struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    config: CacheConfig,
}

/// Bounded key/value cache with per-entry expiration.
///
/// Safe to share across tasks via `Arc`; all mutation happens behind an
/// internal lock. Lookups never fail: an expired or evicted entry is simply
/// absent and the caller recomputes.
#[derive(Debug)]
pub struct TtlCache<T> {
    inner: RwLock<CacheState<T>>,
}

impl<T> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: RwLock::new(CacheState {
                entries: HashMap::new(),
                config,
            }),
        }
    }

    /// Store a value under `key`, stamped with the current time.
    ///
    /// Inserting a new key at capacity evicts the oldest entry first, so the
    /// live-entry count never exceeds `max_size`. Overwriting an existing key
    /// refreshes its timestamp and evicts nothing.
    pub fn set(&self, key: impl Into<String>, data: T) {
        let key = key.into();
        let mut state = self.inner.write().unwrap();
        if !state.entries.contains_key(&key) && state.entries.len() >= state.config.max_size {
            evict_oldest(&mut state.entries);
        }
        state.entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remove all entries. This is the coarse write-invalidation primitive.
    pub fn clear(&self) {
        let mut state = self.inner.write().unwrap();
        let dropped = state.entries.len();
        state.entries.clear();
        debug!(entries = dropped, "cache cleared");
    }

    /// Replace the cache limits at runtime.
    ///
    /// If the new `max_size` is smaller than the current entry count, oldest
    /// entries are evicted until the bound holds again.
    pub fn configure(&self, config: CacheConfig) {
        let mut state = self.inner.write().unwrap();
        state.config = config;
        while state.entries.len() > config.max_size {
            evict_oldest(&mut state.entries);
        }
    }

    /// Current limits.
    pub fn config(&self) -> CacheConfig {
        self.inner.read().unwrap().config
    }

    /// Number of physically present entries (expired-but-unswept included).
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> TtlCache<T> {
    /// Look up `key`, returning `None` when missing or expired.
    ///
    /// An expired entry is deleted on the failed lookup (lazy expiration).
    pub fn get(&self, key: &str) -> Option<T> {
        {
            let state = self.inner.read().unwrap();
            let entry = state.entries.get(key)?;
            if entry.stored_at.elapsed() <= state.config.expiration {
                return Some(entry.data.clone());
            }
        }

        let mut state = self.inner.write().unwrap();
        let expiration = state.config.expiration;
        // Re-check under the write lock; a concurrent `set` may have
        // refreshed the entry between the two lock acquisitions.
        let still_expired = state
            .entries
            .get(key)
            .is_some_and(|e| e.stored_at.elapsed() > expiration);
        if still_expired {
            state.entries.remove(key);
            debug!(key, "dropped expired cache entry");
        }
        None
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> Invalidate for TtlCache<T> {
    fn invalidate(&self) {
        self.clear();
    }
}

/// Evict the entry with the smallest `stored_at`. Ties are broken by map
/// iteration order, which is arbitrary but deterministic for a given state.
fn evict_oldest<T>(entries: &mut HashMap<String, CacheEntry<T>>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, e)| e.stored_at)
        .map(|(k, _)| k.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
        debug!(key = %key, "evicted oldest cache entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_cache(max_size: usize, expiration: Duration) -> TtlCache<String> {
        TtlCache::with_config(
            CacheConfig::default()
                .with_max_size(max_size)
                .with_expiration(expiration),
        )
    }

    #[test]
    fn set_then_get_returns_the_stored_value() {
        let cache = TtlCache::new();
        cache.set("product-1", "heirloom tomatoes".to_string());
        assert_eq!(cache.get("product-1").as_deref(), Some("heirloom tomatoes"));
    }

    #[test]
    fn missing_key_is_absent_not_an_error() {
        let cache: TtlCache<String> = TtlCache::new();
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn expired_entry_is_absent_and_deleted_lazily() {
        let cache = small_cache(10, Duration::from_millis(20));
        cache.set("product-1", "kale".to_string());
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("product-1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn insertion_at_capacity_evicts_exactly_the_oldest() {
        let cache = small_cache(2, Duration::from_secs(60));
        cache.set("a", "1".to_string());
        std::thread::sleep(Duration::from_millis(10));
        cache.set("b", "2".to_string());
        std::thread::sleep(Duration::from_millis(10));
        cache.set("c", "3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn overwriting_an_existing_key_does_not_evict() {
        let cache = small_cache(2, Duration::from_secs(60));
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "1-updated".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("1-updated"));
        assert_eq!(cache.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn clear_drops_everything() {
        let cache = small_cache(10, Duration::from_secs(60));
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn shrinking_max_size_evicts_down_to_the_new_bound() {
        let cache = small_cache(4, Duration::from_secs(60));
        cache.set("a", "1".to_string());
        std::thread::sleep(Duration::from_millis(10));
        cache.set("b", "2".to_string());
        std::thread::sleep(Duration::from_millis(10));
        cache.set("c", "3".to_string());

        cache.configure(
            CacheConfig::default()
                .with_max_size(1)
                .with_expiration(Duration::from_secs(60)),
        );

        assert_eq!(cache.len(), 1);
        // Newest entry survives.
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn invalidate_is_clear() {
        let cache = small_cache(10, Duration::from_secs(60));
        cache.set("a", "1".to_string());
        Invalidate::invalidate(&cache);
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn size_bound_holds_for_any_write_sequence(
            writes in proptest::collection::vec(("[a-f]", 0u32..100), 1..50)
        ) {
            let cache = TtlCache::with_config(
                CacheConfig::default()
                    .with_max_size(3)
                    .with_expiration(Duration::from_secs(60)),
            );
            let mut model = std::collections::HashMap::new();

            for (key, value) in writes {
                cache.set(key.clone(), value);
                model.insert(key, value);
                prop_assert!(cache.len() <= 3);
            }

            // Anything still cached must agree with the last write for its key.
            for (key, expected) in &model {
                if let Some(got) = cache.get(key) {
                    prop_assert_eq!(got, *expected);
                }
            }
        }
    }
}
