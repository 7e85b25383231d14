use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// Time source for expiry checks, injected so tests control the clock
/// instead of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    last_access: u64,
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    access_counter: u64,
}

/// Bounded, time-expiring key/value store. Entries expire once their age
/// reaches the TTL they were stored with; at capacity the least-recently-
/// used entry is evicted before an insert. All mutation happens behind the
/// internal mutex, so concurrent fetch workers share one instance freely.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        TtlCache::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                access_counter: 0,
            }),
            clock,
            capacity: capacity.max(1),
        }
    }

    /// Returns the live value for `key`, or `None` when absent or expired.
    /// Expired entries are dropped on contact; a hit refreshes the entry's
    /// recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();

        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => now.duration_since(entry.stored_at) >= entry.ttl,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }

        inner.access_counter += 1;
        let stamp = inner.access_counter;
        let entry = inner.map.get_mut(key).unwrap();
        entry.last_access = stamp;
        Some(entry.value.clone())
    }

    /// Stores or overwrites `key`, evicting the least-recently-used entry
    /// first when the cache is full.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();

        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            // Prefer reclaiming dead entries over evicting live ones.
            inner.map.retain(|_, entry| now.duration_since(entry.stored_at) < entry.ttl);

            if inner.map.len() >= self.capacity {
                if let Some(lru_key) = inner.map.iter().min_by_key(|(_, entry)| entry.last_access).map(|(k, _)| k.clone()) {
                    debug!("cache at capacity, evicting least-recently-used entry");
                    inner.map.remove(&lru_key);
                }
            }
        }

        inner.access_counter += 1;
        let stamp = inner.access_counter;
        inner.map.insert(
            key,
            Entry {
                value,
                stored_at: now,
                ttl,
                last_access: stamp,
            },
        );
    }

    /// Drops every entry; the operator-facing "stale data" recovery hatch.
    pub fn invalidate_all(&self) {
        self.inner.lock().unwrap().map.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic clock advanced by hand.
    struct ManualClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            ManualClock {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }
    }

    fn cache_with_manual_clock(capacity: usize) -> (TtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (TtlCache::with_clock(capacity, Arc::clone(&clock) as Arc<dyn Clock>), clock)
    }

    #[test]
    fn entry_is_served_before_ttl_and_gone_at_ttl() {
        let (cache, clock) = cache_with_manual_clock(10);
        cache.put("key".to_string(), 42, Duration::from_secs(60));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"key".to_string()), Some(42));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"key".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn overwrite_restarts_the_ttl() {
        let (cache, clock) = cache_with_manual_clock(10);
        cache.put("key".to_string(), 1, Duration::from_secs(60));

        clock.advance(Duration::from_secs(50));
        cache.put("key".to_string(), 2, Duration::from_secs(60));

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get(&"key".to_string()), Some(2));
    }

    #[test]
    fn insert_at_capacity_evicts_exactly_the_least_recently_used() {
        let (cache, _clock) = cache_with_manual_clock(3);
        cache.put("a".to_string(), 1, Duration::from_secs(60));
        cache.put("b".to_string(), 2, Duration::from_secs(60));
        cache.put("c".to_string(), 3, Duration::from_secs(60));

        // Touch a and c; b becomes the LRU entry.
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));

        cache.put("d".to_string(), 4, Duration::from_secs(60));

        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        assert_eq!(cache.get(&"d".to_string()), Some(4));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn expired_entries_are_reclaimed_before_live_ones_are_evicted() {
        let (cache, clock) = cache_with_manual_clock(2);
        cache.put("short".to_string(), 1, Duration::from_secs(10));
        cache.put("long".to_string(), 2, Duration::from_secs(600));

        clock.advance(Duration::from_secs(30));
        cache.put("new".to_string(), 3, Duration::from_secs(600));

        assert_eq!(cache.get(&"long".to_string()), Some(2));
        assert_eq!(cache.get(&"new".to_string()), Some(3));
        assert_eq!(cache.get(&"short".to_string()), None);
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let (cache, _clock) = cache_with_manual_clock(10);
        cache.put("a".to_string(), 1, Duration::from_secs(60));
        cache.put("b".to_string(), 2, Duration::from_secs(60));

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn concurrent_access_does_not_lose_entries() {
        use std::sync::Arc as StdArc;
        let cache = StdArc::new(TtlCache::<u32, u32>::new(128));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = StdArc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..32 {
                        cache.put(worker * 32 + i, i, Duration::from_secs(60));
                        assert_eq!(cache.get(&(worker * 32 + i)), Some(i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 128);
    }
}
