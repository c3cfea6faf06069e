//! Bounded retry for whole operations.
//!
//! Each attempt re-runs the full operation. The pause between attempts is
//! configurable and defaults to none: lookups here are rare and run on the
//! background worker, so an immediate retry is enough.

use std::future::Future;
use std::time::Duration;

use sky_core::GeocodeConfig;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 0;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl From<&GeocodeConfig> for RetryConfig {
    fn from(config: &GeocodeConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay_ms, config.retry_delay_ms)
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Calculate the delay after a failed attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Should retry the operation
    Retry,
    /// Should not retry - permanent failure
    NoRetry,
}

/// The last error of an operation that did not succeed
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub last: E,
    /// True when every allowed attempt was used
    pub exhausted: bool,
}

/// Run `operation` until it succeeds, `classify` rejects the error, or the
/// attempt budget runs out.
///
/// # Example
/// ```ignore
/// let place = with_retry(&RetryConfig::default(), || lookup(&query), |_| RetryDecision::Retry).await?;
/// ```
pub async fn with_retry<T, E, F, Fut, C>(
    config: &RetryConfig,
    mut operation: F,
    classify: C,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if classify(&e) == RetryDecision::NoRetry {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(RetryFailure {
                        attempts: attempt,
                        last: e,
                        exhausted: false,
                    });
                }

                if attempt >= max_attempts {
                    tracing::error!("All {} attempts exhausted: {}", max_attempts, e);
                    return Err(RetryFailure {
                        attempts: attempt,
                        last: e,
                        exhausted: true,
                    });
                }

                tracing::warn!("Attempt {} of {} failed: {}", attempt, max_attempts, e);

                let delay = config.delay_for_attempt(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::ZERO);
        assert_eq!(config.delay_for_attempt(2), Duration::ZERO);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(3, 100, 5000);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new(10, 100, 1000);
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryConfig::new(0, 0, 0).max_attempts, 1);
    }

    #[test]
    fn test_from_geocode_config() {
        let config = RetryConfig::from(&GeocodeConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert!(config.initial_delay.is_zero());
    }

    #[tokio::test]
    async fn test_stops_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(
            &RetryConfig::default(),
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>("boom") }
            },
            |_| RetryDecision::Retry,
        )
        .await;

        let failure = result.unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(failure.attempts, 3);
        assert!(failure.exhausted);
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let calls = Cell::new(0);
        let result = with_retry(
            &RetryConfig::default(),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| RetryDecision::Retry,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(
            &RetryConfig::default(),
            || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>("fatal") }
            },
            |_| RetryDecision::NoRetry,
        )
        .await;

        let failure = result.unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(!failure.exhausted);
    }
}
