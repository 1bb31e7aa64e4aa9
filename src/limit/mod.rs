//! Fixed-window rate limiting.
//!
//! Counters live in the shared store as `rate:{scope}:{bucket}` with the
//! window as TTL; the first request creates the counter, every request
//! increments it, and the window resets atomically when the counter expires.
//! The read-and-increment is one atomic store operation; a get-then-set
//! would race under concurrent requests to the same bucket.
//!
//! Known property of fixed windows, documented rather than hidden: a caller
//! timing requests across a window boundary can spend up to twice the limit
//! within a span shorter than one window.

use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use crate::store::StoreHandle;

/// Gate verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        /// Requests left in the current window.
        remaining: u64,
    },
    Denied {
        /// Time until the window resets; never longer than the window.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Fixed-window request counter per `{scope}:{bucket}`.
///
/// One limiter serves every scope; callers pick the scope (`ip` for the
/// generic gate, `chat` for the per-user chat gate) and its limit/window.
#[derive(Clone)]
pub struct RateLimiter {
    store: StoreHandle,
}

impl RateLimiter {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Count this request and decide.
    ///
    /// Exactly `limit` requests pass per window; the next is denied with the
    /// window's remaining time as retry-after. A store outage fails open:
    /// rate limiting silently becomes a no-op rather than an error.
    pub async fn check(
        &self,
        scope: &str,
        bucket: &str,
        limit: u64,
        window: Duration,
    ) -> Decision {
        let key = format!("rate:{scope}:{bucket}");
        match self.store.incr(&key, window).await {
            Ok(count) if count.count <= limit => Decision::Allowed {
                remaining: limit - count.count,
            },
            Ok(count) => {
                counter!("raffica_rate_denied_total").increment(1);
                let retry_after = count.remaining.max(Duration::from_secs(1)).min(window);
                debug!(scope, bucket, count = count.count, limit, "request denied by rate window");
                Decision::Denied { retry_after }
            }
            Err(error) => {
                counter!("raffica_rate_degraded_total").increment(1);
                warn!(scope, bucket, error = %error, "rate store unreachable, allowing request");
                Decision::Allowed { remaining: limit }
            }
        }
    }
}
