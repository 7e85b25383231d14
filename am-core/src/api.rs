use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use itertools::Itertools;
use mockall::automock;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use am_domain::{City, ItemId, ItemHistory, PriceQuote};

use crate::errors::{classify_status, FetchError, FetchErrorKind};

/// Seam between the fetch pipeline and the upstream API; mocked in the
/// fetcher and repository tests.
#[automock]
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Current prices for up to one batch of items across the given cities.
    /// An item/city pair without market data is simply absent from the
    /// response; that is not an error.
    async fn fetch_prices(&self, item_ids: &[ItemId], cities: &[City]) -> Result<Vec<PriceQuote>, FetchError>;

    /// Daily price/volume history for one item in one city.
    async fn fetch_history(&self, item_id: &ItemId, city: City, days: u32) -> Result<Vec<ItemHistory>, FetchError>;
}

/// Client for the Albion Online Data Project REST API.
#[derive(Debug, Clone)]
pub struct AodpClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl AodpClient {
    pub fn new(client: ClientWithMiddleware, base_url: impl Into<String>) -> Self {
        AodpClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn prices_url(&self, item_ids: &[ItemId]) -> String {
        format!("{}/api/v2/stats/prices/{}.json", self.base_url, item_ids.iter().join(","))
    }

    fn history_url(&self, item_id: &ItemId) -> String {
        format!("{}/api/v2/stats/history/{}.json", self.base_url, item_id)
    }

    /// Sends the request and decodes the body, translating terminal
    /// failures into the fetch-error taxonomy. By the time a transient
    /// status is seen here the retry middleware has already given up on it.
    async fn make_api_call<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
        let resp = request.send().await.map_err(|e| FetchError::exhausted(format!("{e:#}")))?;

        let status = resp.status();
        if let Some(kind) = classify_status(status) {
            let body = resp.text().await.unwrap_or_default();
            let kind = match kind {
                FetchErrorKind::TransientNetwork => FetchErrorKind::ExhaustedRetries,
                other => other,
            };
            return Err(FetchError::new(kind, format!("status {status}: {body}")));
        }

        let body = resp.text().await.map_err(|e| FetchError::decode(format!("failed to read body: {e}")))?;
        serde_json::from_str(&body).map_err(|e| FetchError::decode(format!("error decoding response: {e}; body was: '{body}'")))
    }
}

#[async_trait]
impl MarketApi for AodpClient {
    async fn fetch_prices(&self, item_ids: &[ItemId], cities: &[City]) -> Result<Vec<PriceQuote>, FetchError> {
        let url = self.prices_url(item_ids);
        let locations = cities.iter().join(",");
        debug!(%url, %locations, "fetching current prices");

        Self::make_api_call(self.client.get(url).query(&[("locations", locations)])).await
    }

    async fn fetch_history(&self, item_id: &ItemId, city: City, days: u32) -> Result<Vec<ItemHistory>, FetchError> {
        let url = self.history_url(item_id);
        let end = Utc::now();
        let start = end - ChronoDuration::days(days as i64);
        debug!(%url, %city, days, "fetching price history");

        Self::make_api_call(self.client.get(url).query(&[
            ("locations", city.to_string()),
            ("date", start.format("%m-%d-%Y").to_string()),
            ("end_date", end.format("%m-%d-%Y").to_string()),
            ("time-scale", "24".to_string()),
        ]))
        .await
    }
}
