//! Per-device in-memory token bucket.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_s: f64,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    fn new(capacity: f64, refill_per_s: f64, now: DateTime<Utc>) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_s,
            last_refill: now,
        }
    }

    fn try_consume(&mut self, cost: f64, now: DateTime<Utc>) -> Result<(), u64> {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_per_s).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= cost {
            self.tokens -= cost;
            Ok(())
        } else {
            let deficit = cost - self.tokens;
            let retry_after_s = (deficit / self.refill_per_s).ceil().max(1.0) as u64;
            Err(retry_after_s)
        }
    }
}

/// Per-device token buckets, one per-minute budget each.
pub struct RateLimiterRegistry {
    buckets: Mutex<HashMap<String, Bucket>>,
    per_minute_budget: f64,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::with_budget(10_000.0)
    }

    pub fn with_budget(per_minute_budget: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            per_minute_budget,
        }
    }

    /// Returns `Ok(())` if `cost` tokens (the batch's point count) were
    /// available, or `Err(retry_after_s)` on breach.
    pub fn try_consume(&self, device_id: &str, cost: u32, now: DateTime<Utc>) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap();
        let refill_per_s = self.per_minute_budget / 60.0;
        let bucket = buckets
            .entry(device_id.to_string())
            .or_insert_with(|| Bucket::new(self.per_minute_budget, refill_per_s, now));
        bucket.try_consume(cost as f64, now)
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_within_budget() {
        let registry = RateLimiterRegistry::with_budget(100.0);
        let now = Utc::now();
        assert!(registry.try_consume("dev-1", 50, now).is_ok());
        assert!(registry.try_consume("dev-1", 50, now).is_ok());
    }

    #[test]
    fn breaches_return_retry_after() {
        let registry = RateLimiterRegistry::with_budget(100.0);
        let now = Utc::now();
        registry.try_consume("dev-1", 100, now).unwrap();
        let err = registry.try_consume("dev-1", 1, now).unwrap_err();
        assert!(err >= 1);
    }

    #[test]
    fn refills_over_time() {
        let registry = RateLimiterRegistry::with_budget(60.0);
        let now = Utc::now();
        registry.try_consume("dev-1", 60, now).unwrap();
        let later = now + chrono::Duration::seconds(30);
        assert!(registry.try_consume("dev-1", 30, later).is_ok());
    }

    #[test]
    fn buckets_are_independent_per_device() {
        let registry = RateLimiterRegistry::with_budget(10.0);
        let now = Utc::now();
        registry.try_consume("dev-1", 10, now).unwrap();
        assert!(registry.try_consume("dev-2", 10, now).is_ok());
    }
}
