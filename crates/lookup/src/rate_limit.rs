//! Rate limiting for the postal directory.
//!
//! A token bucket kept as a theoretical arrival time: each granted token
//! pushes the arrival time forward by one interval, and up to `burst_size`
//! intervals of credit may be outstanding. Time comes from `tokio::time`, so
//! tests can run it on a paused clock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between calls once the burst is spent.
    #[serde(with = "crate::serde_millis")]
    pub min_interval: Duration,
    /// Calls that may be made back to back before spacing applies.
    pub burst_size: u64,
    /// Longest a caller waits for a token before giving up.
    #[serde(with = "crate::serde_millis")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1100),
            burst_size: 1,
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_burst_size(mut self, burst: u64) -> Self {
        self.burst_size = burst;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    arrival: Mutex<Instant>,
    total_requests: AtomicU64,
    total_waited: AtomicU64,
    total_rejected: AtomicU64,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            arrival: Mutex::new(Instant::now()),
            total_requests: AtomicU64::new(0),
            total_waited: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn burst_window(&self) -> Duration {
        let credit = u32::try_from(self.config.burst_size.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config.min_interval.saturating_mul(credit)
    }

    /// Take a token at `now`, or report how long until one is free.
    fn reserve(&self, now: Instant) -> Option<Duration> {
        let mut arrival = self.arrival.lock().unwrap_or_else(PoisonError::into_inner);
        let next = (*arrival).max(now);
        let backlog = next.saturating_duration_since(now);
        let window = self.burst_window();
        if backlog <= window {
            *arrival = next + self.config.min_interval;
            None
        } else {
            Some(backlog - window)
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        if self.reserve(Instant::now()).is_none() {
            true
        } else {
            self.total_rejected.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    /// Acquire a token, waiting up to `max_wait`.
    /// Returns false if no token became available in time.
    pub async fn acquire(&self) -> bool {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let mut waited = false;

        loop {
            let Some(wait) = self.reserve(Instant::now()) else {
                if waited {
                    self.total_waited.fetch_add(1, Ordering::SeqCst);
                }
                return true;
            };

            if start.elapsed() + wait > self.config.max_wait {
                self.total_rejected.fetch_add(1, Ordering::SeqCst);
                return false;
            }

            waited = true;
            sleep(wait).await;
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let arrival = *self.arrival.lock().unwrap_or_else(PoisonError::into_inner);
        let backlog = arrival.saturating_duration_since(now).as_secs_f64();
        let interval = self.config.min_interval.as_secs_f64();
        let burst = self.config.burst_size as f64;
        let available_tokens = if interval == 0.0 {
            burst
        } else {
            (burst - backlog / interval).max(0.0)
        };

        RateLimitStats {
            available_tokens,
            total_requests: self.total_requests.load(Ordering::SeqCst),
            total_waited: self.total_waited.load(Ordering::SeqCst),
            total_rejected: self.total_rejected.load(Ordering::SeqCst),
        }
    }
}

/// Statistics for rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub available_tokens: f64,
    pub total_requests: u64,
    pub total_waited: u64,
    pub total_rejected: u64,
}

impl RateLimitStats {
    /// Fraction of requests that had to wait (0.0 to 1.0).
    pub fn wait_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_waited as f64 / self.total_requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every(millis: u64) -> RateLimitConfig {
        RateLimitConfig::default().with_min_interval(Duration::from_millis(millis))
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_starts_full() {
        let bucket = TokenBucket::new(every(1000).with_burst_size(3));
        assert_eq!(bucket.stats().available_tokens, 3.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        let stats = bucket.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.total_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_by_min_interval() {
        let bucket = TokenBucket::new(every(1100));
        let start = Instant::now();
        for _ in 0..3 {
            assert!(bucket.acquire().await);
        }
        assert_eq!(start.elapsed(), Duration::from_millis(2200));
        assert_eq!(bucket.stats().total_waited, 2);
        assert_eq!(bucket.stats().wait_rate(), 2.0 / 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_refills_while_idle() {
        let bucket = TokenBucket::new(every(100));
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        sleep(Duration::from_millis(100)).await;
        assert!(bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_gives_up_after_max_wait() {
        let bucket = TokenBucket::new(every(10_000).with_max_wait(Duration::from_millis(50)));
        assert!(bucket.acquire().await);
        assert!(!bucket.acquire().await);
        assert_eq!(bucket.stats().total_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_burst_saturates_instead_of_wrapping() {
        let bucket = TokenBucket::new(every(1).with_burst_size((1 << 32) + 1));
        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert_eq!(bucket.stats().total_rejected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_waits() {
        let bucket = TokenBucket::new(every(0));
        let start = Instant::now();
        for _ in 0..10 {
            assert!(bucket.acquire().await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
