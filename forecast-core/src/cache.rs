//! In-memory, time-bounded memoization of provider calls.
//!
//! Entries expire lazily: an entry past its deadline is dropped by the lookup
//! that observes it. Failed producer calls are never stored.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt::Debug, future::Future, hash::Hash, sync::Arc};

use crate::{
    clock::Clock,
    model::{Language, LocationQuery, Units},
    provider::Endpoint,
};

/// Identity of a cached provider response. The city is stored trimmed and
/// lowercased so "Paris" and " paris" share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub endpoint: Endpoint,
    pub city: String,
    pub units: Units,
    pub language: Language,
}

impl CacheKey {
    pub fn new(endpoint: Endpoint, query: &LocationQuery) -> Self {
        Self {
            endpoint,
            city: query.city.trim().to_lowercase(),
            units: query.units,
            language: query.language,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the stored value while `now <= expires_at`.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let entry = entries.get(key)?;
        if now <= entry.expires_at {
            return Some(entry.value.clone());
        }

        entries.remove(key);
        None
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries
            .lock()
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Returns the live cached value for `key`, or runs `producer` and stores
    /// its successful result for `ttl`.
    ///
    /// The lock is released while the producer runs, so two overlapping
    /// misses for one key both call the producer and the last one to finish
    /// wins.
    pub async fn cached<F, Fut, E>(&self, key: K, ttl: Duration, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            tracing::debug!(?key, "cache hit");
            return Ok(value);
        }

        tracing::debug!(?key, "cache miss");
        let value = producer().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (Arc<ManualClock>, TtlCache<&'static str, u32>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(clock.clone());
        (clock, cache)
    }

    fn is_empty<K, V>(cache: &TtlCache<K, V>) -> bool {
        cache.entries.lock().is_empty()
    }

    fn current_key(city: &str, units: Units, language: Language) -> CacheKey {
        CacheKey::new(
            Endpoint::Current,
            &LocationQuery::new(city, units, language),
        )
    }

    #[test]
    fn key_normalizes_city() {
        let a = current_key("Paris", Units::Metric, Language::En);
        let b = current_key(" PARIS ", Units::Metric, Language::En);
        assert_eq!(a, b);
    }

    #[test]
    fn key_separates_endpoint_units_and_language() {
        let query = LocationQuery::new("Paris", Units::Metric, Language::En);
        let base = CacheKey::new(Endpoint::Current, &query);

        assert_ne!(base, CacheKey::new(Endpoint::Forecast, &query));
        assert_ne!(base, current_key("Paris", Units::Imperial, Language::En));
        assert_ne!(base, current_key("Paris", Units::Metric, Language::Ru));
    }

    #[test]
    fn entry_is_live_up_to_and_including_deadline() {
        let (clock, cache) = cache();
        cache.insert("k", 1, Duration::seconds(60));

        clock.advance(Duration::seconds(60));
        assert_eq!(cache.get(&"k"), Some(1));

        clock.advance(Duration::milliseconds(1));
        assert_eq!(cache.get(&"k"), None);
        assert!(is_empty(&cache), "expired entry is dropped on lookup");
    }

    #[tokio::test]
    async fn cached_calls_producer_once_within_ttl() {
        let (_clock, cache) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let value = cache
                .cached("k", Duration::minutes(10), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_refetches_after_expiry() {
        let (clock, cache) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let produce =
            move || async move { Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) as u32) };
        let ttl = Duration::minutes(10);

        assert_eq!(cache.cached("k", ttl, produce).await, Ok(0));
        clock.advance(Duration::minutes(11));
        assert_eq!(cache.cached("k", ttl, produce).await, Ok(1));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let (_clock, cache) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..2 {
            let result = cache
                .cached("k", Duration::minutes(10), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("boom")
                })
                .await;
            assert_eq!(result, Err("boom"));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(is_empty(&cache));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let (clock, cache) = cache();
        cache.insert("k", 1, Duration::MAX);
        clock.advance(Duration::days(365 * 100));
        assert_eq!(cache.get(&"k"), Some(1));
    }
}
