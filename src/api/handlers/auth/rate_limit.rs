//! Rate limiting primitives for auth flows.
//!
//! This is a coarse per-address guard in front of the per-account lockout,
//! not a replacement for it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

pub const DEFAULT_BURST: u32 = 10;
pub const DEFAULT_PER_MINUTE: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    Login,
    ForgotPassword,
    ResetPassword,
    VerifyEmail,
    ResendVerification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug)]
struct Bucket {
    tokens: f64,
    refreshed: Instant,
}

/// Token bucket per `(action, client address)`.
///
/// Requests without a resolvable address share one bucket per action.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    capacity: f64,
    refill_per_second: f64,
    buckets: Mutex<HashMap<(RateLimitAction, String), Bucket>>,
}

impl TokenBucketRateLimiter {
    #[must_use]
    pub fn new(burst: u32, per_minute: u32) -> Self {
        Self {
            capacity: f64::from(burst.max(1)),
            refill_per_second: f64::from(per_minute) / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn check_at(
        &self,
        ip: Option<&str>,
        action: RateLimitAction,
        now: Instant,
    ) -> RateLimitDecision {
        let key = (action, ip.unwrap_or("unknown").to_string());
        let Ok(mut buckets) = self.buckets.lock() else {
            // A poisoned map only loses counters; fail open like the noop limiter.
            return RateLimitDecision::Allowed;
        };
        let capacity = self.capacity;
        let refill = self.refill_per_second;
        // Full buckets carry no information; drop them so the map stays bounded.
        buckets.retain(|_, bucket| {
            let elapsed = now.saturating_duration_since(bucket.refreshed);
            bucket.tokens + elapsed.as_secs_f64() * refill < capacity
        });
        let bucket = buckets.entry(key).or_insert(Bucket {
            tokens: capacity,
            refreshed: now,
        });
        let elapsed = now.saturating_duration_since(bucket.refreshed);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * refill).min(capacity);
        bucket.refreshed = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }
}

impl RateLimiter for TokenBucketRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        self.check_at(ip, action, Instant::now())
    }
}
