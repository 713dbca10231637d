//! Shared request pacing
//!
//! All workers draw from one governor bucket. A rate of `r` requests per
//! second becomes one token every `1 / r` seconds with a burst of one, so
//! fractional rates pace requests further apart instead of rounding to zero.

use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket shared by every worker of a run
pub struct RequestRateLimiter {
    bucket: Option<(DirectLimiter, Duration)>,
}

impl RequestRateLimiter {
    /// Pace at `rate` requests per second across all workers
    ///
    /// `None`, zero, negative and non-finite rates disable pacing.
    ///
    /// ```
    /// use std::time::Duration;
    /// use volley_core::worker::RequestRateLimiter;
    ///
    /// let limiter = RequestRateLimiter::new(Some(0.5));
    /// assert_eq!(limiter.period(), Some(Duration::from_secs(2)));
    /// assert!(RequestRateLimiter::new(None).period().is_none());
    /// ```
    pub fn new(rate: Option<f64>) -> Self {
        let bucket = rate
            .filter(|rps| rps.is_finite() && *rps > 0.0)
            .and_then(|rps| {
                let period = Duration::from_secs_f64(rps.recip());
                Quota::with_period(period).map(|quota| (RateLimiter::direct(quota), period))
            });
        Self { bucket }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Wait for the next token
    ///
    /// Returns `false` when `cancel` fires first; the caller goes back to
    /// its cancellation check rather than sending.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let Some((limiter, _)) = &self.bucket else {
            return true;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = limiter.until_ready() => true,
        }
    }

    /// Interval between tokens, `None` when pacing is off
    pub fn period(&self) -> Option<Duration> {
        self.bucket.as_ref().map(|(_, period)| *period)
    }

    /// Whether requests are paced at all
    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    #[cfg(test)]
    fn ready_now(&self) -> bool {
        self.bucket
            .as_ref()
            .map_or(true, |(limiter, _)| limiter.check().is_ok())
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("period", &self.period())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_pacing_off() {
        for rate in [None, Some(0.0), Some(-3.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let limiter = RequestRateLimiter::new(rate);
            assert!(!limiter.is_enabled(), "{rate:?}");
            assert!(limiter.ready_now());
        }
        assert!(!RequestRateLimiter::unlimited().is_enabled());
    }

    #[test]
    fn test_fractional_rate_is_a_period() {
        let limiter = RequestRateLimiter::new(Some(0.25));
        assert_eq!(limiter.period(), Some(Duration::from_secs(4)));
        assert!(limiter.ready_now());
        assert!(!limiter.ready_now());
    }

    #[test]
    fn test_burst_of_one() {
        let limiter = RequestRateLimiter::new(Some(200.0));
        assert_eq!(limiter.period(), Some(Duration::from_millis(5)));
        assert!(limiter.ready_now());
        assert!(!limiter.ready_now());
    }

    #[tokio::test]
    async fn test_unpaced_wait_ignores_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(RequestRateLimiter::unlimited().wait(&cancel).await);
    }

    #[tokio::test]
    async fn test_wait_spaces_tokens() {
        let limiter = RequestRateLimiter::new(Some(50.0));
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..4 {
            assert!(limiter.wait(&cancel).await);
        }
        // first token is immediate, three more at 20ms each
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let limiter = RequestRateLimiter::new(Some(0.1));
        let cancel = CancellationToken::new();
        assert!(limiter.wait(&cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!limiter.wait(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_debug_shows_period() {
        let debug = format!("{:?}", RequestRateLimiter::new(Some(4.0)));
        assert!(debug.contains("RequestRateLimiter"));
        assert!(debug.contains("250ms"));
    }
}
