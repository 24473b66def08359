//! Per-source token bucket rate limiting.
//!
//! Each source gets its own bucket with a refill rate and burst capacity.
//! Unlike a generic limiter, callers here need to know exactly how long to
//! wait before the next token is available, so the bucket is hand-rolled on
//! atomics rather than built on a crate whose API only exposes "wait or
//! reject".

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A single source's token bucket.
///
/// Tokens refill continuously at `refill_per_sec`, capped at `burst`. The
/// bucket stores its token count scaled by `SCALE` so that fractional
/// refills can be tracked with an integer atomic.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    refill_per_sec: f64,
    burst: f64,
    tokens_scaled: AtomicI64,
    last_refill_nanos: AtomicU64,
    blocked_until_nanos: AtomicU64,
    start: Instant,
}

const SCALE: f64 = 1_000_000.0;

impl RateLimiter {
    pub fn new(name: &str, refill_per_sec: f64, burst: f64) -> Self {
        Self {
            name: name.to_string(),
            refill_per_sec,
            burst,
            tokens_scaled: AtomicI64::new((burst * SCALE) as i64),
            last_refill_nanos: AtomicU64::new(0),
            blocked_until_nanos: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    fn refill(&self) {
        let now_nanos = self.start.elapsed().as_nanos() as u64;
        let last = self.last_refill_nanos.swap(now_nanos, Ordering::SeqCst);
        if last == 0 {
            return;
        }
        let elapsed_secs = (now_nanos.saturating_sub(last)) as f64 / 1_000_000_000.0;
        let added = elapsed_secs * self.refill_per_sec * SCALE;
        if added <= 0.0 {
            return;
        }
        let max_scaled = (self.burst * SCALE) as i64;
        self.tokens_scaled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current + added as i64).min(max_scaled))
            })
            .ok();
    }

    /// Attempt to take one token. Returns `Ok(())` if allowed, or
    /// `Err(retry_after)` with the wait until a token would be available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now_nanos = self.start.elapsed().as_nanos() as u64;
        let blocked_until = self.blocked_until_nanos.load(Ordering::SeqCst);
        if now_nanos < blocked_until {
            return Err(Duration::from_nanos(blocked_until - now_nanos));
        }

        self.refill();
        let one = SCALE as i64;
        let result = self
            .tokens_scaled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current >= one {
                    Some(current - one)
                } else {
                    None
                }
            });

        match result {
            Ok(_) => Ok(()),
            Err(current) => {
                let deficit = (one - current).max(0) as f64 / SCALE;
                let wait_secs = if self.refill_per_sec > 0.0 {
                    deficit / self.refill_per_sec
                } else {
                    1.0
                };
                tracing::debug!(source = %self.name, wait_secs, "rate limit exhausted");
                Err(Duration::from_secs_f64(wait_secs.max(0.0)))
            }
        }
    }

    /// Block (async) until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Empty the bucket and refuse any token until at least `retry_after`
    /// from now, honoring a server-provided `Retry-After` header.
    pub fn reset_after(&self, retry_after: Duration) {
        self.tokens_scaled.store(0, Ordering::SeqCst);
        let now_nanos = self.start.elapsed().as_nanos() as u64;
        let resume_at = now_nanos.saturating_add(retry_after.as_nanos() as u64);
        self.blocked_until_nanos.store(resume_at, Ordering::SeqCst);
    }
}

/// Per-source rate limit configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub refill_per_sec: f64,
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_per_sec: 1.0,
            burst: 1.0,
        }
    }
}

/// Manager for multiple rate limiters, one per source, created lazily with
/// source-specific configuration.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Arc<RwLock<HashMap<String, Arc<RateLimiter>>>>,
    configs: Arc<RwLock<HashMap<String, RateLimitConfig>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            configs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a per-source configuration. Must be called before the first
    /// [`get`](Self::get) for that source to take effect.
    pub fn configure(&self, source_id: &str, config: RateLimitConfig) {
        self.configs
            .write()
            .expect("RwLock poisoned")
            .insert(source_id.to_string(), config);
    }

    pub fn get(&self, source_id: &str) -> Arc<RateLimiter> {
        {
            let read_guard = self.limiters.read().expect("RwLock poisoned");
            if let Some(limiter) = read_guard.get(source_id) {
                return Arc::clone(limiter);
            }
        }

        let mut write_guard = self.limiters.write().expect("RwLock poisoned");
        if let Some(limiter) = write_guard.get(source_id) {
            return Arc::clone(limiter);
        }

        let config = self
            .configs
            .read()
            .expect("RwLock poisoned")
            .get(source_id)
            .copied()
            .unwrap_or_default();

        let limiter = Arc::new(RateLimiter::new(source_id, config.refill_per_sec, config.burst));
        write_guard.insert(source_id.to_string(), Arc::clone(&limiter));
        limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_allows_immediate_requests_up_to_capacity() {
        let limiter = RateLimiter::new("test", 1.0, 3.0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn test_exhausted_bucket_reports_positive_retry_after() {
        let limiter = RateLimiter::new("test", 2.0, 1.0);
        assert!(limiter.try_acquire().is_ok());
        match limiter.try_acquire() {
            Err(wait) => assert!(wait > Duration::from_millis(0)),
            Ok(()) => panic!("expected rate limit to be exhausted"),
        }
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new("test", 20.0, 1.0);
        limiter.acquire().await;
        limiter.acquire().await;
    }

    #[test]
    fn test_reset_after_blocks_until_the_given_duration() {
        let limiter = RateLimiter::new("test", 100.0, 5.0);
        limiter.reset_after(Duration::from_millis(50));
        match limiter.try_acquire() {
            Err(wait) => assert!(wait > Duration::from_millis(0)),
            Ok(()) => panic!("expected limiter to be blocked after reset_after"),
        }
    }

    #[test]
    fn test_registry_returns_same_limiter_for_same_source() {
        let registry = RateLimiterRegistry::new();
        let a = registry.get("arxiv");
        let b = registry.get("arxiv");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registry_honors_per_source_config() {
        let registry = RateLimiterRegistry::new();
        registry.configure(
            "openalex",
            RateLimitConfig {
                refill_per_sec: 5.0,
                burst: 2.0,
            },
        );
        let limiter = registry.get("openalex");
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }
}
