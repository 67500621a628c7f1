//! Request pacing with exponential backoff on HTTP 429.
//!
//! The day loop is sequential, so a single-threaded limiter is enough.
//! One `wait` precedes each day's fan-out and each per-activity detail
//! fetch; a 429 anywhere doubles the delay until the upstream calms down.

use std::time::{Duration, Instant};

pub struct RateLimiter {
    /// Minimum delay between requests
    min_delay: Duration,
    /// Current backoff delay
    backoff: Duration,
    /// Maximum backoff delay
    max_backoff: Duration,
    backoff_multiplier: f64,
    last_request: Option<Instant>,
    /// Consecutive rate limit hits
    consecutive_429s: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Conservative defaults: ~60 req/min with 1s starting backoff.
    pub fn new() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            last_request: None,
            consecutive_429s: 0,
        }
    }

    /// Wait before making the next request
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            let required_delay = self.min_delay + self.backoff;

            if elapsed < required_delay {
                tokio::time::sleep(required_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Handle a successful request
    pub fn on_success(&mut self) {
        self.backoff = Duration::from_secs(1);
        self.consecutive_429s = 0;
    }

    /// Handle a rate limit (HTTP 429) response
    pub fn on_rate_limit(&mut self) {
        self.consecutive_429s += 1;
        self.backoff = Duration::from_secs_f64(
            (self.backoff.as_secs_f64() * self.backoff_multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );
    }

    /// Whether the sync should give up for this run rather than hammer a
    /// throttling upstream.
    pub fn should_pause(&self) -> bool {
        self.consecutive_429s >= 5
    }

    pub fn current_backoff(&self) -> Duration {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_defaults() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.min_delay, Duration::from_millis(1000));
        assert_eq!(limiter.backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff() {
        let mut limiter = RateLimiter::new();

        limiter.on_rate_limit();
        assert_eq!(limiter.backoff, Duration::from_secs(2));

        limiter.on_rate_limit();
        assert_eq!(limiter.backoff, Duration::from_secs(4));

        limiter.on_rate_limit();
        assert_eq!(limiter.backoff, Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_max() {
        let mut limiter = RateLimiter::new();
        for _ in 0..20 {
            limiter.on_rate_limit();
        }
        assert!(limiter.backoff <= limiter.max_backoff);
    }

    #[test]
    fn test_reset_on_success() {
        let mut limiter = RateLimiter::new();

        limiter.on_rate_limit();
        limiter.on_rate_limit();
        assert!(limiter.backoff > Duration::from_secs(1));

        limiter.on_success();
        assert_eq!(limiter.backoff, Duration::from_secs(1));
        assert_eq!(limiter.consecutive_429s, 0);
    }

    #[test]
    fn test_should_pause_after_repeated_429s() {
        let mut limiter = RateLimiter::new();

        for _ in 0..4 {
            limiter.on_rate_limit();
            assert!(!limiter.should_pause());
        }

        limiter.on_rate_limit();
        assert!(limiter.should_pause());
    }
}
