use std::str::FromStr;
use std::time::Duration;

use am_domain::{City, Region};

/// Construction-time tunables for the acquisition layer. Values come from
/// the environment (`AM_*` variables) with defaults matching the upstream
/// API's published limits; the core never re-reads the environment after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub region: Region,
    pub default_city: City,
    /// TTL for current-price entries.
    pub price_ttl: Duration,
    /// TTL for historical aggregates.
    pub history_ttl: Duration,
    pub max_concurrent_requests: usize,
    pub batch_size: usize,
    pub cache_capacity: usize,
    /// Outbound request budget per rolling minute.
    pub rate_limit_per_minute: u32,
    pub request_timeout: Duration,
    /// Overrides the region host; used by tests pointing at a local server.
    pub base_url: Option<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            region: Region::Europe,
            default_city: City::Caerleon,
            price_ttl: Duration::from_secs(180),
            history_ttl: Duration::from_secs(300),
            max_concurrent_requests: 5,
            batch_size: 100,
            cache_capacity: 1000,
            rate_limit_per_minute: 180,
            request_timeout: Duration::from_secs(30),
            base_url: None,
        }
    }
}

impl MarketConfig {
    pub fn from_env() -> Result<Self, String> {
        fn parse_env_var<T: FromStr>(name: &str, default: T) -> Result<T, String>
        where
            T::Err: std::fmt::Display,
        {
            match std::env::var(name) {
                Ok(raw) => raw.parse().map_err(|e| format!("invalid value for '{name}': {e}")),
                Err(_) => Ok(default),
            }
        }

        let defaults = MarketConfig::default();
        Ok(MarketConfig {
            region: parse_env_var("AM_REGION", defaults.region)?,
            default_city: parse_env_var("AM_DEFAULT_CITY", defaults.default_city)?,
            price_ttl: Duration::from_secs(parse_env_var("AM_PRICE_TTL_SECS", defaults.price_ttl.as_secs())?),
            history_ttl: Duration::from_secs(parse_env_var("AM_HISTORY_TTL_SECS", defaults.history_ttl.as_secs())?),
            max_concurrent_requests: parse_env_var("AM_MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?,
            batch_size: parse_env_var("AM_BATCH_SIZE", defaults.batch_size)?,
            cache_capacity: parse_env_var("AM_CACHE_CAPACITY", defaults.cache_capacity)?,
            rate_limit_per_minute: parse_env_var("AM_RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute)?,
            request_timeout: Duration::from_secs(parse_env_var("AM_REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?),
            base_url: std::env::var("AM_BASE_URL").ok(),
        })
    }

    /// Host serving this configuration's region, unless overridden.
    pub fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| self.region.base_url().to_string())
    }
}
