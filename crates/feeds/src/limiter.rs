//! Token-bucket rate limiter shared by each external-API client.
//!
//! One limiter instance guards one upstream quota. The quota is per process,
//! not per user: every bot user shares the same exchange/indicator API
//! allowance, so the limiter sits inside the client, at the single point
//! where requests leave the process.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Rate limit configuration: at most `max_calls` per `window`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    /// One call per `period`.
    pub fn per_period(period: Duration) -> Self {
        Self::new(1, period)
    }

    /// One call per `period` stretched by a safety buffer percentage, so a
    /// strict upstream window is never hit exactly on the boundary.
    pub fn per_period_buffered(period: Duration, buffer_pct: f64) -> Self {
        Self::per_period(period.mul_f64(1.0 + buffer_pct))
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Token-bucket limiter with a blocking async `acquire`.
///
/// Tokens replenish continuously over the window. `acquire` is the suspension
/// point callers hit right before network I/O; it sleeps until a token is
/// available, so a caller invoked faster than the limit blocks instead of
/// bursting.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            bucket: Mutex::new(Bucket {
                tokens: limit.max_calls as f64,
                last_update: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    fn replenish(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update);
        let refill =
            elapsed.as_secs_f64() / self.limit.window.as_secs_f64() * self.limit.max_calls as f64;
        bucket.tokens = (bucket.tokens + refill).min(self.limit.max_calls as f64);
        bucket.last_update = now;
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.replenish(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until a token becomes available. Zero if one is available now.
    pub async fn time_until_available(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        self.replenish(&mut bucket);
        if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let needed = 1.0 - bucket.tokens;
            let per_token = self.limit.window.as_secs_f64() / self.limit.max_calls as f64;
            Duration::from_secs_f64(needed * per_token)
        }
    }

    /// Block until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = self.time_until_available().await;
            if wait.is_zero() {
                if self.try_acquire().await {
                    return;
                }
            } else {
                tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limiter_starts_full() {
        let limiter = RateLimiter::new(RateLimit::new(2, Duration::from_secs(60)));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_limiter_reports_wait_when_empty() {
        let limiter = RateLimiter::new(RateLimit::per_period(Duration::from_secs(60)));
        assert!(limiter.try_acquire().await);
        let wait = limiter.time_until_available().await;
        assert!(wait > Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_limiter_replenishes() {
        let limiter = RateLimiter::new(RateLimit::new(10, Duration::from_millis(100)));
        for _ in 0..10 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire().await);
    }

    #[test]
    fn test_buffered_period() {
        let limit = RateLimit::per_period_buffered(Duration::from_secs(20), 0.05);
        assert_eq!(limit.max_calls, 1);
        assert_eq!(limit.window, Duration::from_secs(21));
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_available() {
        let limiter = RateLimiter::new(RateLimit::new(1, Duration::from_millis(50)));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
