//! TTL Cache with an Injected Clock
//!
//! Discovery results are cached per (token, chain) with a fixed TTL. The
//! clock is a trait dependency so tests drive expiry deterministically
//! instead of sleeping against wall-clock time.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time (production)
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Key-value cache where entries expire a fixed duration after insertion
pub struct TtlCache<K, V> {
    entries: HashMap<K, (V, Instant)>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Fetch a live entry. Expired entries are treated as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let (value, inserted_at) = self.entries.get(key)?;
        if self.clock.now().duration_since(*inserted_at) > self.ttl {
            return None;
        }
        Some(value.clone())
    }

    /// Insert an entry, evicting everything already expired so stale
    /// entries never accumulate across the process lifetime
    pub fn insert(&mut self, key: K, value: V) {
        self.purge_expired();
        self.entries.insert(key, (value, self.clock.now()));
    }

    /// Drop every expired entry
    pub fn purge_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test clock advanced by hand
    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn test_hit_before_expiry() {
        let clock = Arc::new(ManualClock::new());
        let mut cache: TtlCache<&str, u64> = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.insert("usdc-8453", 42);
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"usdc-8453"), Some(42));
    }

    #[test]
    fn test_miss_after_expiry() {
        let clock = Arc::new(ManualClock::new());
        let mut cache: TtlCache<&str, u64> = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.insert("usdc-8453", 42);
        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get(&"usdc-8453"), None);

        // still occupies a slot until purged
        assert_eq!(cache.len(), 1);
        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_evicts_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let mut cache: TtlCache<&str, u64> = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.insert("old", 1);
        clock.advance(Duration::from_secs(61));
        cache.insert("new", 2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
        assert_eq!(cache.get(&"old"), None);
    }

    #[test]
    fn test_reinsert_refreshes() {
        let clock = Arc::new(ManualClock::new());
        let mut cache: TtlCache<&str, u64> = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.insert("k", 1);
        clock.advance(Duration::from_secs(45));
        cache.insert("k", 2);
        clock.advance(Duration::from_secs(45));

        // 90s after the first insert but only 45s after the second
        assert_eq!(cache.get(&"k"), Some(2));
    }
}
