use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared, WeakShared};
use futures::{FutureExt, StreamExt};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use am_domain::{City, ItemId, PriceQuote};

use crate::api::MarketApi;
use crate::errors::FetchError;

pub type PriceKey = (ItemId, City);
pub type PriceMap = HashMap<PriceKey, Vec<PriceQuote>>;

type BatchKey = (Vec<ItemId>, Vec<City>);
type SharedBatch = Shared<BoxFuture<'static, Arc<Result<Vec<PriceQuote>, FetchError>>>>;

/// One batch that did not resolve, with the items it covered.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub item_ids: Vec<ItemId>,
    pub error: FetchError,
}

/// Partial success is the normal return shape: whatever resolved is in
/// `prices`, whatever did not is accounted for in `failures`.
#[derive(Debug, Clone, Default)]
pub struct PriceFetchOutcome {
    pub prices: PriceMap,
    pub failures: Vec<BatchFailure>,
}

impl PriceFetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn quotes_for(&self, item_id: &ItemId, city: City) -> &[PriceQuote] {
        self.prices.get(&(item_id.clone(), city)).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Splits large item sets into bounded batches and fans them out through a
/// fixed-width worker pool. Identical concurrent batches share a single
/// upstream call; unrelated batches are never serialized against each
/// other. The call joins all of its batches before returning, so it acts
/// as a synchronization barrier for the caller.
#[derive(Clone)]
pub struct BatchFetcher {
    api: Arc<dyn MarketApi>,
    batch_size: usize,
    max_concurrency: usize,
    in_flight: Arc<Mutex<HashMap<BatchKey, WeakShared<BoxFuture<'static, Arc<Result<Vec<PriceQuote>, FetchError>>>>>>>,
}

impl BatchFetcher {
    pub fn new(api: Arc<dyn MarketApi>, batch_size: usize, max_concurrency: usize) -> Self {
        BatchFetcher {
            api,
            batch_size: batch_size.max(1),
            max_concurrency: max_concurrency.max(1),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetches current prices for every (item, city) combination. With a
    /// deadline, batches still unresolved at expiry are abandoned
    /// best-effort and reported as `DeadlineExceeded` failures next to the
    /// results that did complete.
    pub async fn fetch_prices(&self, item_ids: &[ItemId], cities: &[City], deadline: Option<Duration>) -> PriceFetchOutcome {
        let ids = item_ids.iter().unique().cloned().sorted().collect_vec();
        let cities = cities.iter().unique().copied().sorted().collect_vec();
        if ids.is_empty() || cities.is_empty() {
            return PriceFetchOutcome::default();
        }

        let cancel = CancellationToken::new();
        if let Some(deadline) = deadline {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            });
        }

        let batches = ids.chunks(self.batch_size).map(|chunk| chunk.to_vec()).collect_vec();
        debug!(items = ids.len(), cities = cities.len(), batches = batches.len(), "dispatching price fetch");

        let results: Vec<(Vec<ItemId>, Result<Vec<PriceQuote>, FetchError>)> = futures::stream::iter(batches.into_iter().map(|batch| {
            let shared = self.batch_future(batch.clone(), cities.clone());
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => (batch, Err(FetchError::deadline())),
                    result = shared => (batch, (*result).clone()),
                }
            }
        }))
        .buffer_unordered(self.max_concurrency)
        .collect()
        .await;

        let mut outcome = PriceFetchOutcome::default();
        for (batch, result) in results {
            match result {
                Ok(quotes) => {
                    for quote in quotes {
                        outcome.prices.entry((quote.item_id.clone(), quote.city)).or_default().push(quote);
                    }
                }
                Err(error) => {
                    warn!(items = batch.len(), %error, "batch failed");
                    outcome.failures.push(BatchFailure { item_ids: batch, error });
                }
            }
        }
        outcome
    }

    /// Returns the in-flight future for this batch key, creating it when no
    /// identical fetch is running. The registry holds weak handles, so an
    /// abandoned fetch does not pin its entry alive forever, and completed
    /// fetches remove themselves.
    fn batch_future(&self, batch: Vec<ItemId>, cities: Vec<City>) -> SharedBatch {
        let key = (batch.clone(), cities.clone());
        let mut in_flight = self.in_flight.lock().unwrap();

        if let Some(existing) = in_flight.get(&key).and_then(WeakShared::upgrade) {
            debug!(items = batch.len(), "joining identical in-flight batch");
            return existing;
        }

        let api = Arc::clone(&self.api);
        let registry = Arc::clone(&self.in_flight);
        let cleanup_key = key.clone();
        let shared = async move {
            let result = api.fetch_prices(&batch, &cities).await;
            registry.lock().unwrap().remove(&cleanup_key);
            Arc::new(result)
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            in_flight.insert(key, weak);
        }
        shared
    }
}
