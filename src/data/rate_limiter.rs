//! Token bucket rate limiter for API request throttling.
//!
//! Proactively limits request rates so the upstream never has to tell
//! us to back off.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    /// Current available tokens (fractional)
    tokens: f64,
    /// Last refill timestamp
    last_refill: Instant,
}

/// A token bucket rate limiter.
///
/// Allows bursts up to one second's worth of requests, refilling
/// continuously at `requests_per_minute / 60_000` tokens per millisecond.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens in the bucket
    capacity: f64,
    /// Tokens added per millisecond
    refill_rate_per_ms: f64,
    bucket: Mutex<Bucket>,
    /// Name for logging
    name: String,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `requests_per_minute` - Maximum requests allowed per minute
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        // One-second window keeps the rate smooth without starving bursts
        let capacity = (requests_per_minute as f64 / 60.0).ceil().max(1.0);
        let refill_rate_per_ms = requests_per_minute as f64 / 60_000.0;

        Self {
            capacity,
            refill_rate_per_ms,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            name: name.into(),
        }
    }

    /// Acquire a token, waiting if necessary.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire().await {
                return;
            }

            let wait_ms = (1.0 / self.refill_rate_per_ms).ceil() as u64;
            let wait_time = Duration::from_millis(wait_ms.clamp(10, 1000));

            debug!(
                limiter = %self.name,
                wait_ms = wait_time.as_millis(),
                "Rate limited, waiting for token"
            );

            tokio::time::sleep(wait_time).await;
        }
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns `true` if a token was acquired, `false` otherwise.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(bucket.last_refill).as_millis() as f64;

        if elapsed_ms > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed_ms * self.refill_rate_per_ms).min(self.capacity);
            bucket.last_refill = now;
        }
    }

    /// Get current available tokens (for debugging/monitoring).
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Get the configured capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new("test", 300);
        assert_eq!(limiter.capacity(), 5.0); // 300/60 = 5 req/sec
    }

    #[tokio::test]
    async fn test_try_acquire_exhausts() {
        let limiter = RateLimiter::new("test", 60); // 1 req/sec
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_refill_after_wait() {
        let limiter = RateLimiter::new("test", 6000); // 100 req/sec for fast test

        while limiter.try_acquire().await {}

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_available_tokens_capped() {
        let limiter = RateLimiter::new("test", 300);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let tokens = limiter.available_tokens().await;
        assert!(tokens > 0.0);
        assert!(tokens <= 5.0);
    }
}
