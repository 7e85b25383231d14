use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use metrics::counter;
use tracing::debug;

use am_domain::{City, ItemHistory, ItemId, PriceQuote};

use crate::api::MarketApi;
use crate::cache::TtlCache;
use crate::configuration::MarketConfig;
use crate::errors::FetchError;
use crate::fetcher::{BatchFetcher, PriceFetchOutcome, PriceKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Facade over the cache and the batch fetcher. Current prices and
/// historical aggregates carry different TTLs; fresh fetch results are
/// written back so the next caller within the TTL window never reaches the
/// network. An item/city pair the upstream reported no data for is cached
/// as empty — "no data" is an answer too.
pub struct PriceRepository {
    api: Arc<dyn MarketApi>,
    fetcher: BatchFetcher,
    price_cache: TtlCache<PriceKey, Vec<PriceQuote>>,
    history_cache: TtlCache<(ItemId, City, u32), Vec<ItemHistory>>,
    price_ttl: Duration,
    history_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PriceRepository {
    pub fn new(api: Arc<dyn MarketApi>, config: &MarketConfig) -> Self {
        PriceRepository {
            fetcher: BatchFetcher::new(Arc::clone(&api), config.batch_size, config.max_concurrent_requests),
            api,
            price_cache: TtlCache::new(config.cache_capacity),
            history_cache: TtlCache::new(config.cache_capacity),
            price_ttl: config.price_ttl,
            history_ttl: config.history_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current prices for every requested (item, city) pair. Cached pairs
    /// are served locally; items with any uncached pair are refetched in
    /// one upstream round (the price endpoint answers all cities of an
    /// item in a single call). Fetch failures surface per batch in the
    /// outcome, never as a call-level error.
    pub async fn current_prices(&self, item_ids: &[ItemId], cities: &[City], deadline: Option<Duration>) -> PriceFetchOutcome {
        let ids = item_ids.iter().unique().cloned().sorted().collect_vec();
        let cities = cities.iter().unique().copied().sorted().collect_vec();

        let mut outcome = PriceFetchOutcome::default();
        let mut uncached_items = Vec::new();

        for item_id in &ids {
            let cached_pairs: Option<Vec<_>> = cities
                .iter()
                .map(|city| self.price_cache.get(&(item_id.clone(), *city)).map(|quotes| ((item_id.clone(), *city), quotes)))
                .collect();

            match cached_pairs {
                Some(pairs) => {
                    self.record_hits(pairs.len() as u64);
                    for (key, quotes) in pairs {
                        if !quotes.is_empty() {
                            outcome.prices.insert(key, quotes);
                        }
                    }
                }
                None => uncached_items.push(item_id.clone()),
            }
        }

        if uncached_items.is_empty() {
            return outcome;
        }
        self.record_misses((uncached_items.len() * cities.len()) as u64);

        let mut fetched = self.fetcher.fetch_prices(&uncached_items, &cities, deadline).await;

        let failed_items: HashSet<&ItemId> = fetched.failures.iter().flat_map(|failure| failure.item_ids.iter()).collect();
        for item_id in &uncached_items {
            if failed_items.contains(item_id) {
                continue;
            }
            for city in &cities {
                let key = (item_id.clone(), *city);
                let quotes = fetched.prices.remove(&key).unwrap_or_default();
                self.price_cache.put(key.clone(), quotes.clone(), self.price_ttl);
                if !quotes.is_empty() {
                    outcome.prices.insert(key, quotes);
                }
            }
        }
        outcome.failures.append(&mut fetched.failures);

        outcome
    }

    /// Daily history for one item in one city, cached under the longer
    /// history TTL.
    pub async fn history(&self, item_id: &ItemId, city: City, days: u32) -> Result<Vec<ItemHistory>, FetchError> {
        let key = (item_id.clone(), city, days);
        if let Some(history) = self.history_cache.get(&key) {
            self.record_hits(1);
            return Ok(history);
        }
        self.record_misses(1);

        let history = self.api.fetch_history(item_id, city, days).await?;
        self.history_cache.put(key, history.clone(), self.history_ttl);
        Ok(history)
    }

    /// Operator hatch for "stale data" recovery: drops both caches. The
    /// hit/miss counters survive, they describe the repository's lifetime.
    pub fn clear_cache(&self) {
        debug!("clearing price and history caches");
        self.price_cache.invalidate_all();
        self.history_cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record_hits(&self, n: u64) {
        if n > 0 {
            self.hits.fetch_add(n, Ordering::Relaxed);
            counter!("price_cache_hits_total").increment(n);
        }
    }

    fn record_misses(&self, n: u64) {
        if n > 0 {
            self.misses.fetch_add(n, Ordering::Relaxed);
            counter!("price_cache_misses_total").increment(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchErrorKind;
    use am_domain::{PriceQuote, Quality};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use test_log::test;

    /// Records each upstream call; items named `EMPTY` get no quotes and
    /// items named `FAIL` poison their batch.
    struct RecordingApi {
        calls: AtomicUsize,
        requested_batches: Mutex<Vec<Vec<ItemId>>>,
    }

    impl RecordingApi {
        fn new() -> Self {
            RecordingApi {
                calls: AtomicUsize::new(0),
                requested_batches: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn batches(&self) -> Vec<Vec<ItemId>> {
            self.requested_batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MarketApi for RecordingApi {
        async fn fetch_prices(&self, item_ids: &[ItemId], cities: &[City]) -> Result<Vec<PriceQuote>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_batches.lock().unwrap().push(item_ids.to_vec());

            if item_ids.iter().any(|id| id.0 == "FAIL") {
                return Err(FetchError::exhausted("upstream kept failing"));
            }

            Ok(item_ids
                .iter()
                .filter(|id| id.0 != "EMPTY")
                .flat_map(|item_id| {
                    cities.iter().map(|city| PriceQuote {
                        item_id: item_id.clone(),
                        city: *city,
                        quality: Quality::Normal,
                        sell_price_min: 100,
                        sell_price_max: 110,
                        buy_price_max: 80,
                        timestamp: None,
                    })
                })
                .collect())
        }

        async fn fetch_history(&self, item_id: &ItemId, city: City, _days: u32) -> Result<Vec<ItemHistory>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ItemHistory {
                item_id: item_id.clone(),
                location: city,
                quality: Quality::Normal,
                data: Vec::new(),
            }])
        }
    }

    fn repository(api: &Arc<RecordingApi>) -> PriceRepository {
        PriceRepository::new(Arc::clone(api) as Arc<dyn MarketApi>, &MarketConfig::default())
    }

    #[test(tokio::test)]
    async fn second_identical_call_is_served_from_cache() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let ids = [ItemId::new("T4_ORE")];
        let cities = [City::Thetford, City::Martlock];

        let first = repo.current_prices(&ids, &cities, None).await;
        let second = repo.current_prices(&ids, &cities, None).await;

        assert_eq!(api.call_count(), 1);
        assert_eq!(first.prices, second.prices);
        assert_eq!(repo.stats(), CacheStats { hits: 2, misses: 2 });
    }

    #[test(tokio::test)]
    async fn only_uncached_items_go_upstream() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let cities = [City::Thetford];

        repo.current_prices(&[ItemId::new("T4_ORE")], &cities, None).await;
        repo.current_prices(&[ItemId::new("T4_ORE"), ItemId::new("T5_ORE")], &cities, None).await;

        assert_eq!(api.call_count(), 2);
        assert_eq!(api.batches()[1], vec![ItemId::new("T5_ORE")]);
    }

    #[test(tokio::test)]
    async fn no_data_answers_are_cached_too() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let ids = [ItemId::new("EMPTY")];

        let first = repo.current_prices(&ids, &[City::Thetford], None).await;
        let second = repo.current_prices(&ids, &[City::Thetford], None).await;

        assert_eq!(api.call_count(), 1);
        assert!(first.prices.is_empty() && first.is_complete());
        assert!(second.prices.is_empty() && second.is_complete());
    }

    #[test(tokio::test)]
    async fn failures_are_reported_and_never_cached() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let ids = [ItemId::new("FAIL")];

        let first = repo.current_prices(&ids, &[City::Thetford], None).await;
        let second = repo.current_prices(&ids, &[City::Thetford], None).await;

        assert_eq!(api.call_count(), 2);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].error.kind, FetchErrorKind::ExhaustedRetries);
        assert_eq!(second.failures.len(), 1);
    }

    #[test(tokio::test)]
    async fn clear_cache_forces_a_refetch() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let ids = [ItemId::new("T4_ORE")];

        repo.current_prices(&ids, &[City::Thetford], None).await;
        repo.clear_cache();
        repo.current_prices(&ids, &[City::Thetford], None).await;

        assert_eq!(api.call_count(), 2);
        assert_eq!(repo.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test(tokio::test)]
    async fn history_uses_its_own_cache() {
        let api = Arc::new(RecordingApi::new());
        let repo = repository(&api);
        let item = ItemId::new("T4_ORE");

        let first = repo.history(&item, City::Thetford, 7).await.unwrap();
        let second = repo.history(&item, City::Thetford, 7).await.unwrap();
        // A different window is a different cache entry.
        repo.history(&item, City::Thetford, 30).await.unwrap();

        assert_eq!(api.call_count(), 2);
        assert_eq!(first, second);
        assert_eq!(repo.stats(), CacheStats { hits: 1, misses: 2 });
    }
}
