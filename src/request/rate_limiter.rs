//! Per-site token-bucket rate limiting.
//!
//! Each configured site gets a bucket holding up to `burst` tokens, refilled
//! at `rate` tokens per second. Every outbound request takes one token,
//! waiting for a refill when the bucket is empty. Sites without a bucket are
//! not limited.
//!
//! # Example
//!
//! ```
//! use ptharvest_core::request::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new();
//! limiter.configure("hdexample", 2.0, 4);
//!
//! // Up to four requests proceed at once, then two per second.
//! limiter.acquire("hdexample").await;
//!
//! // Unconfigured sites never wait.
//! limiter.acquire("elsewhere").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative wait per site.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Shared per-site rate limiter.
///
/// `RateLimiter` is `Send + Sync` and meant to be shared behind an `Arc`
/// by every site requester.
#[derive(Debug, Default)]
pub struct RateLimiter {
    /// Buckets are behind `Arc` so the `DashMap` shard lock is released
    /// before awaiting on the bucket mutex.
    sites: DashMap<String, Arc<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
    cumulative_delay_ms: AtomicU64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self.cumulative_delay_ms.fetch_add(delay_ms, Ordering::SeqCst) + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter with no configured sites.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit for `site`: `rate` requests per second with bursts of
    /// `burst`. A non-positive `rate` removes the limit.
    #[instrument(skip(self))]
    pub fn configure(&self, site: &str, rate: f64, burst: u32) {
        if rate.is_finite() && rate > 0.0 {
            debug!("configuring site rate limit");
            self.sites.insert(site.to_string(), Arc::new(Bucket::new(rate, burst)));
        } else {
            debug!("site rate limit disabled");
            self.sites.remove(site);
        }
    }

    /// Returns true if `site` has a limit configured.
    #[must_use]
    pub fn is_limited(&self, site: &str) -> bool {
        self.sites.contains_key(site)
    }

    /// Takes one token for `site`, waiting for a refill if needed.
    #[instrument(skip(self))]
    pub async fn acquire(&self, site: &str) {
        let Some(bucket) = self.sites.get(site).map(|entry| Arc::clone(entry.value())) else {
            return;
        };

        let mut state = bucket.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * bucket.rate).min(bucket.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return;
        }

        let delay = Duration::from_secs_f64((1.0 - state.tokens) / bucket.rate);
        let cumulative = bucket.add_cumulative_delay(delay);
        debug!(
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "applying rate limit delay"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                site,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive rate limiting - consider reducing request volume to this site"
            );
        }

        tokio::time::sleep(delay).await;
        state.tokens = 0.0;
        state.last_refill = Instant::now();
    }
}
