use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Extensions;
use reqwest::{Client, Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tracing::{debug, error};

use crate::budget::{RateLimitMiddleware, RequestBudget};

const USER_AGENT: &str = concat!("albion-market-core/", env!("CARGO_PKG_VERSION"));

/// Maximum retry attempts after the initial try. Transient failures
/// (network errors, 429, 5xx, per-attempt timeouts) are retried with
/// jittered exponential backoff between 1s and 8s; other 4xx surface
/// immediately.
const MAX_RETRIES: u32 = 3;
const RETRY_MIN_BACKOFF: Duration = Duration::from_secs(1);
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Builds the outbound client stack. Ordering matters: the retry layer
/// wraps the rate-limit layer, so every retry attempt re-acquires a budget
/// permit before hitting the wire.
pub fn create_client(budget: Arc<RequestBudget>, request_timeout: Duration) -> ClientWithMiddleware {
    let reqwest_client = Client::builder().user_agent(USER_AGENT).timeout(request_timeout).build().unwrap();

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(RETRY_MIN_BACKOFF, RETRY_MAX_BACKOFF)
        .build_with_max_retries(MAX_RETRIES);

    ClientBuilder::new(reqwest_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(RequestLoggingMiddleware)
        .with(RateLimitMiddleware::new(budget))
        .build()
}

/// Logs each attempt with its duration; rate-limit responses stay at debug
/// level to keep retries from spamming the log.
pub struct RequestLoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for RequestLoggingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let start = Instant::now();
        let method = req.method().clone();
        let url = req.url().clone();

        let result = next.run(req, extensions).await;

        let duration = start.elapsed();
        match &result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    debug!(%method, %url, %status, ?duration, "request hit the upstream rate limit");
                } else {
                    error!(%method, %url, %status, ?duration, "request failed");
                }
            }
            Err(e) => {
                error!(%method, %url, error = %e, ?duration, "request error");
            }
            _ => {
                debug!(%method, %url, ?duration, "request succeeded");
            }
        }

        result
    }
}
