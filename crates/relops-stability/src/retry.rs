//! Retry with exponential backoff and jitter
//!
//! Only retryable errors (timeouts, refused/reset connections, 5xx) are
//! retried; everything else fails fast on the first attempt.

use rand::Rng;
use relops_common::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub multiplier: f64,
    /// Jitter added on top of the delay, as a fraction of it
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            multiplier: 2.0,
            jitter: 0.05,
        }
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryResult<T> {
    pub value: Option<T>,
    pub error: Option<Error>,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> RetryResult<T> {
    /// Collapse into a plain result, surfacing only the final outcome
    pub fn into_result(self) -> Result<T> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(Error::Internal("retry finished without outcome".to_string())),
        }
    }
}

/// Execute `operation` with exponential-backoff retries, reporting the
/// final value or error together with attempts used and total duration.
pub async fn retry<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut last_error: Option<Error> = None;

    for attempt in 1..=config.max_attempts.max(1) {
        debug!(
            "Executing {} (attempt {}/{})",
            operation_name, attempt, config.max_attempts
        );

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("Operation {} succeeded on attempt {}", operation_name, attempt);
                }
                return RetryResult {
                    value: Some(value),
                    error: None,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                };
            }
            Err(error) => {
                let retryable = error.is_retryable();
                warn!(
                    "Operation {} failed on attempt {} ({}): {}",
                    operation_name,
                    attempt,
                    error.category(),
                    error
                );
                last_error = Some(error);

                if !retryable || attempt == config.max_attempts {
                    return RetryResult {
                        value: None,
                        error: last_error,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    };
                }

                let delay = backoff_delay(attempt - 1, config);
                debug!("Waiting {:?} before retrying {}", delay, operation_name);
                sleep(delay).await;
            }
        }
    }

    RetryResult {
        value: None,
        error: last_error,
        attempts: config.max_attempts,
        elapsed: started.elapsed(),
    }
}

/// Convenience wrapper returning only the final value or error
pub async fn retry_value<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(operation_name, config, operation).await.into_result()
}

/// delay = min(initial * multiplier^attempt, max) plus jitter
fn backoff_delay(completed_attempts: u32, config: &RetryConfig) -> Duration {
    let exponential =
        config.initial_delay.as_millis() as f64 * config.multiplier.powi(completed_attempts as i32);
    let capped = exponential.min(config.max_delay.as_millis() as f64);
    let jitter = capped * rand::thread_rng().gen_range(0.0..=config.jitter);
    Duration::from_millis((capped + jitter) as u64)
}
