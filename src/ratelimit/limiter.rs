//! Fixed-window rate limiter.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::BucketKey;
use super::policy::{OverflowPolicy, RateLimitPolicy};
use super::store::{BucketStore, InMemoryBucketStore};

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request fits in the current window
    pub admitted: bool,
    /// The policy's limit
    pub limit: u64,
    /// Requests left in the current window, never negative
    pub remaining: u64,
    /// Whole seconds until the window resets, at least 1
    pub retry_after_secs: u64,
}

/// Fixed-window counter over a [`BucketStore`].
///
/// The limiter is cheap to clone and thread-safe; all clones share the same
/// store. It never suspends: a check is one synchronous store call.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    overflow: OverflowPolicy,
}

impl RateLimiter {
    /// Create a rate limiter over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryBucketStore::new()))
    }

    pub fn with_store(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            overflow: OverflowPolicy::default(),
        }
    }

    /// Set what happens to the stored count past the limit.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    /// Count one request against `key` and decide whether it is admitted.
    ///
    /// The count is recorded even when the request is rejected, so a caller
    /// hammering a bucket stays rejected until the window rolls over.
    pub fn check_and_consume(
        &self,
        key: &BucketKey,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> RateLimitDecision {
        let limit = policy.limit();
        let window = policy.window();
        debug_assert!(limit > 0, "rate limit policy with zero limit");
        debug_assert!(!window.is_zero(), "rate limit policy with zero window");

        let cap = match self.overflow {
            OverflowPolicy::Accumulate => u64::MAX,
            OverflowPolicy::Saturate => limit.saturating_add(1),
        };

        let hit = self.store.hit(key, window, cap, now);

        let decision = if hit.opened_window {
            RateLimitDecision {
                admitted: true,
                limit,
                remaining: limit - 1,
                retry_after_secs: ceil_secs(window).max(1),
            }
        } else {
            let count = hit.entry.count;
            let reset_in = hit.entry.window_end.saturating_duration_since(now);
            RateLimitDecision {
                admitted: count <= limit,
                limit,
                remaining: limit.saturating_sub(count),
                retry_after_secs: ceil_secs(reset_in).max(1),
            }
        };

        trace!(
            key = %key,
            count = hit.entry.count,
            remaining = decision.remaining,
            admitted = decision.admitted,
            "Checked rate limit"
        );

        if !decision.admitted {
            debug!(
                key = %key,
                count = hit.entry.count,
                limit = limit,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Stored count for a key, if any.
    pub fn counter_value(&self, key: &BucketKey) -> Option<u64> {
        self.store.get(key).map(|entry| entry.count)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}
