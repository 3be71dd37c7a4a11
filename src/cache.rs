//! The cache trait and its default in-memory, persistent implementation.

use crate::identity::CacheKey;
use std::any::Any;
use std::sync::Arc;

/// An opaque, cloneable cache value. The caller on either side of a cache
/// lookup knows the concrete type for a given key; the cache itself never
/// inspects it.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// A mapping from `(source-name, identity)` to a previously resolved value.
///
/// Implementations are expected to be cheap to clone (the default uses a
/// structurally-shared persistent map) so the interpreter can hand a
/// snapshot to the simplification pass without disturbing its own working
/// copy until a round actually succeeds.
pub trait Cache: Clone + Send + Sync + 'static {
    /// Look up a previously cached value.
    fn get(&self, key: &CacheKey) -> Option<CacheValue>;

    /// Whether `key` has a cached value.
    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Return a new cache with every pair inserted. Existing entries for
    /// the same key are overwritten; the receiver is left unmodified,
    /// consistent with *cache monotonicity* (§8): callers only ever move
    /// forward to the returned snapshot.
    fn insert_all(&self, pairs: Vec<(CacheKey, CacheValue)>) -> Self;
}

/// The default, in-memory [`Cache`]: a persistent (structurally-shared)
/// hash map that grows monotonically within one run and is never evicted.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: im::HashMap<CacheKey, CacheValue>,
}

impl InMemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        InMemoryCache::default()
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.get(key).cloned()
    }

    fn insert_all(&self, pairs: Vec<(CacheKey, CacheValue)>) -> Self {
        let mut entries = self.entries.clone();
        for (key, value) in pairs {
            entries.insert(key, value);
        }
        InMemoryCache { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn key(source: &str, id: i32) -> CacheKey {
        (Arc::from(source), Identity::new(id))
    }

    #[test]
    fn empty_cache_contains_nothing() {
        let cache = InMemoryCache::new();
        assert!(!cache.contains(&key("S", 1)));
    }

    #[test]
    fn insert_all_is_visible_on_the_returned_snapshot_only() {
        let cache = InMemoryCache::new();
        let value: CacheValue = Arc::new(10i32);
        let next = cache.insert_all(vec![(key("S", 1), value.clone())]);

        assert!(!cache.contains(&key("S", 1)), "original cache is unchanged");
        assert!(next.contains(&key("S", 1)));
        assert_eq!(
            *next.get(&key("S", 1)).unwrap().downcast_ref::<i32>().unwrap(),
            10
        );
    }

    #[test]
    fn insert_all_overwrites_existing_keys() {
        let cache = InMemoryCache::new().insert_all(vec![(key("S", 1), Arc::new(1i32))]);
        let cache = cache.insert_all(vec![(key("S", 1), Arc::new(2i32))]);
        assert_eq!(
            *cache.get(&key("S", 1)).unwrap().downcast_ref::<i32>().unwrap(),
            2
        );
    }

    #[test]
    fn cache_is_monotone_with_respect_to_cloning() {
        let base = InMemoryCache::new().insert_all(vec![(key("S", 1), Arc::new(1i32))]);
        let extended = base.insert_all(vec![(key("S", 2), Arc::new(2i32))]);
        assert!(extended.contains(&key("S", 1)));
        assert!(extended.contains(&key("S", 2)));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }
}
