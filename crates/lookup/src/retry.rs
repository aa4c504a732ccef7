//! Retry logic with exponential backoff for directory calls.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; later retries grow by `backoff_multiplier`.
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by up to +/-25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0 = the first try, no delay).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;

        if self.jitter {
            let jitter_range = delay_ms / 4;
            if jitter_range > 0 {
                let jitter = fastrand::u64(0..jitter_range * 2);
                return Duration::from_millis(delay_ms - jitter_range + jitter);
            }
        }

        Duration::from_millis(delay_ms)
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error).
    pub result: Result<T, E>,
    /// Attempts made; 1 means the first try settled it.
    pub attempts: u32,
    pub total_duration: Duration,
    pub succeeded: bool,
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation` until it succeeds, fails with an error `retryable`
/// rejects, or the retries are spent.
///
/// ```
/// use lookup::{execute_with_retry_async, RetryConfig};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = RetryConfig::default().with_base_delay(Duration::from_millis(1));
/// let result = execute_with_retry_async(
///     &config,
///     |_: &String| true,
///     |attempt| async move {
///         if attempt == 0 {
///             Err("connection reset".to_string())
///         } else {
///             Ok("found")
///         }
///     },
/// )
/// .await;
/// assert!(result.succeeded);
/// assert_eq!(result.attempts, 2);
/// # }
/// ```
pub async fn execute_with_retry_async<T, E, R, F, Fut>(
    config: &RetryConfig,
    retryable: R,
    mut operation: F,
) -> RetryResult<T, E>
where
    R: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                    succeeded: true,
                };
            }
            Err(err) if attempt < config.max_retries && retryable(&err) => {
                attempt += 1;
                let delay = config.calculate_delay(attempt);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            Err(err) => {
                return RetryResult {
                    result: Err(err),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                    succeeded: false,
                };
            }
        }
    }
}
