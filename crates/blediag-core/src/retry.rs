//! Bounded retry for link-level operations.
//!
//! Service discovery retries on a fixed cadence; connecting backs off
//! exponentially with jitter. Both are a [`RetryConfig`]. Only transient
//! failures (timeouts, adapter errors, a dropped link) are retried; see
//! [`is_retryable`].
//!
//! ```
//! use std::time::Duration;
//! use blediag_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryConfig::fixed(3, Duration::from_millis(500));
//! let value = with_retry(&policy, "read", || async { Ok::<_, Error>(7u8) }).await?;
//! assert_eq!(value, 7);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Upper bound of the random stretch applied to a jittered delay.
const JITTER_FRACTION: f64 = 0.25;

/// How often, and how far apart, an operation is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first call. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the grown delay.
    pub max_delay: Duration,
    /// Growth factor per retry; 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
    /// Stretch each delay by up to a quarter at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// `max_attempts` calls in total, `delay` apart.
    ///
    /// A `max_attempts` of zero still makes one call.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_attempts.saturating_sub(1),
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Service discovery: three attempts, one second apart.
    pub fn for_discovery() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }

    /// Establishing the link: four attempts starting one second apart,
    /// doubling up to ten seconds, jittered.
    pub fn for_connect() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Total calls allowed, counting the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub(crate) fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = grown.min(self.max_delay.as_secs_f64());
        let stretch = if self.jitter {
            1.0 + rand::rng().random_range(0.0..=JITTER_FRACTION)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * stretch)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted. The last error is returned on exhaustion.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable(&error) || attempt >= max_attempts {
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt - 1);
        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            operation_name, attempt, max_attempts, error, delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Whether another attempt could succeed.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout { .. } | Error::Bluetooth(_) | Error::LinkInactive | Error::Io(_) => true,
        // Discovery has already spent its own attempts.
        Error::DiscoveryFailed { .. }
        | Error::TransportUnavailable(_)
        | Error::UnsupportedOperation { .. }
        | Error::InvalidInput(_)
        | Error::Parse(_)
        | Error::NotFound(_)
        | Error::Cancelled
        | Error::InvalidConfig(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// An operation failing with `error` for its first `failures` calls.
    fn flaky(
        failures: u32,
        error: fn() -> Error,
    ) -> (Arc<AtomicU32>, impl Fn() -> std::future::Ready<Result<u32>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let operation = move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if call < failures { Err(error()) } else { Ok(call) })
        };
        (calls, operation)
    }

    #[test]
    fn test_policies() {
        assert_eq!(RetryConfig::none().max_attempts(), 1);
        assert_eq!(RetryConfig::for_discovery().max_attempts(), 3);
        assert_eq!(RetryConfig::for_connect().max_attempts(), 4);
        assert_eq!(RetryConfig::fixed(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(
            RetryConfig::new(1).jitter(false).max_retries(2),
            RetryConfig {
                max_retries: 2,
                jitter: false,
                ..RetryConfig::default()
            }
        );
    }

    #[test]
    fn test_fixed_delay_does_not_grow() {
        let config = RetryConfig::fixed(4, Duration::from_millis(250));
        for retry in 0..4 {
            assert_eq!(config.delay_for_attempt(retry), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::new(10)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(9), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let config = RetryConfig::for_connect();
        for _ in 0..20 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_classification() {
        assert!(is_retryable(&Error::timeout("read", Duration::from_secs(1))));
        assert!(is_retryable(&Error::LinkInactive));
        assert!(!is_retryable(&Error::device_not_found("HMSoft")));
        assert!(!is_retryable(&Error::unsupported("write", "ffe3")));
        assert!(!is_retryable(&Error::DiscoveryFailed {
            attempts: 3,
            source: Box::new(Error::LinkInactive),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_dropped_link() {
        let (calls, operation) = flaky(2, || Error::LinkInactive);
        let result = with_retry(&RetryConfig::for_connect(), "connect", operation).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let (calls, operation) = flaky(u32::MAX, || {
            Error::timeout("discover", Duration::from_millis(5))
        });
        let result = with_retry(&RetryConfig::for_discovery(), "discover", operation).await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let (calls, operation) = flaky(u32::MAX, || Error::invalid_config("bad"));
        let result = with_retry(&RetryConfig::new(3), "configure", operation).await;

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_cadence_timing() {
        let (_, operation) = flaky(2, || Error::LinkInactive);
        let start = tokio::time::Instant::now();
        with_retry(
            &RetryConfig::fixed(3, Duration::from_millis(300)),
            "read",
            operation,
        )
        .await
        .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }
}
