//! Retry mechanism with randomized backoff
//!
//! Every paginated call goes through [`retry_with_backoff`]. Only errors the
//! predicate accepts are retried; once the retry budget is spent the last
//! error is wrapped in [`Error::RetryExhausted`].

use std::time::Duration;

use crate::alias::RetryConfig;
use crate::error::{Error, Result};

/// Retry a fallible async operation with randomized backoff
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation` - Async closure that returns `Result<T>`
/// * `is_retryable` - Closure that determines if an error should trigger retry
///
/// # Example
/// ```ignore
/// let page = retry_with_backoff(
///     &config,
///     || service.list_objects(&request),
///     is_retryable_error,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if attempt > config.max_retries {
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let backoff = calculate_backoff(config);
                tracing::warn!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Service unavailable, retrying"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Draw a backoff uniformly from the configured window
fn calculate_backoff(config: &RetryConfig) -> Duration {
    let min = config.min_backoff_ms.min(config.max_backoff_ms);
    let span = config.max_backoff_ms - min;
    Duration::from_millis(min + rand_jitter(span + 1))
}

/// Generate pseudo-random jitter without external RNG dependency
fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max.max(1)
}

/// Check if an error is the transient-unavailability class
pub fn is_retryable_error(error: &Error) -> bool {
    error.is_unavailable()
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_retries: u32,
    min_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            min_backoff_ms: defaults.min_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn min_backoff_ms(mut self, ms: u64) -> Self {
        self.min_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            min_backoff_ms: self.min_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
