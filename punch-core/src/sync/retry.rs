//! Backoff for resending a sync request after a transport failure.

use std::future::Future;
use std::time::Duration;

use super::error::SyncError;

/// How often, and how patiently, a failed request is resent.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Adds up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor between delays; anything below 1.0 is taken as 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the given attempt (0-indexed). The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // `multiplier` is public and may hold anything
        let multiplier = self.multiplier.max(1.0);
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            capped + capped * 0.25 * rand::random::<f64>()
        } else {
            capped
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the 0-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "sync request failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_initial_delay(Duration::ZERO)
            .with_jitter(false)
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let policy = RetryPolicy::new(10)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(500));
    }

    #[test]
    fn test_multiplier_below_one_keeps_delay_flat() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(-2.0)
            .with_jitter(false);
        assert_eq!(policy.multiplier, 1.0);
        for attempt in 1..5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(100));
        }

        let raw = RetryPolicy {
            multiplier: -3.0,
            ..policy.clone()
        };
        assert_eq!(raw.delay_for_attempt(2), Duration::from_millis(100));

        let raw = RetryPolicy {
            multiplier: f64::NAN,
            jitter: true,
            ..policy
        };
        assert!(raw.delay_for_attempt(3) <= Duration::from_millis(125));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::new(3).with_initial_delay(Duration::from_millis(100));
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[tokio::test]
    async fn test_retries_transport_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let result = fast(3)
            .run(move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::Transport("connection refused".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fast(2)
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Transport("timed out".into()))
            })
            .await;

        assert!(matches!(result, Err(SyncError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_protocol_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = fast(5)
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Protocol("bad reply".into()))
            })
            .await;

        assert!(matches!(result, Err(SyncError::Protocol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
