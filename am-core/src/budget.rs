use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

/// Global request budget: at most `permits` dispatches per rolling
/// `window`, shared by every fetch worker. `acquire` only ever delays the
/// caller, it cannot fail, and starving the queue permanently is prevented
/// by governor's steady replenishment.
pub struct RequestBudget {
    limiter: DefaultDirectRateLimiter,
}

impl RequestBudget {
    pub fn new(permits: u32, window: Duration) -> Self {
        let permits = NonZeroU32::new(permits.max(1)).unwrap();
        let quota = Quota::with_period(window / permits.get())
            .unwrap_or_else(|| Quota::per_minute(permits))
            .allow_burst(permits);
        RequestBudget {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn per_minute(permits: u32) -> Self {
        RequestBudget::new(permits, Duration::from_secs(60))
    }

    /// Waits until a permit is available. Permits are consumed on return;
    /// there is no release.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Non-blocking probe, used by tests to observe budget exhaustion.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Middleware placing the budget in front of every outbound attempt, so
/// retries re-acquire a permit instead of bypassing the limit.
pub struct RateLimitMiddleware {
    budget: Arc<RequestBudget>,
}

impl RateLimitMiddleware {
    pub fn new(budget: Arc<RequestBudget>) -> Self {
        RateLimitMiddleware { budget }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        self.budget.acquire().await;
        next.run(req, extensions).await
    }
}
