use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Read-through cache with a fixed time-to-live and no invalidation hook.
/// Entries are keyed by static identifiers.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<&'static str, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: &'static str, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: &'static str, value: V, now: Instant) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(60 * 60 * 24);

    #[test]
    fn entry_lives_for_exactly_the_ttl() {
        let cache = TtlCache::new(DAY);
        let t0 = Instant::now();
        cache.insert_at("slots", 4usize, t0);

        assert_eq!(cache.get_at("slots", t0), Some(4));
        assert_eq!(cache.get_at("slots", t0 + DAY - Duration::from_secs(1)), Some(4));
        assert_eq!(cache.get_at("slots", t0 + DAY), None);
        assert_eq!(cache.get_at("other", t0), None);
    }

    #[test]
    fn refill_replaces_expired_value() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("k", "old", t0);
        let later = t0 + Duration::from_secs(30);
        assert_eq!(cache.get_at("k", later), None);

        cache.insert_at("k", "new", later);
        assert_eq!(cache.get_at("k", later + Duration::from_secs(5)), Some("new"));
        assert_eq!(cache.ttl(), Duration::from_secs(10));
    }
}
