//! Stability layer for the relops incident core
//!
//! Per-dependency circuit breakers, exponential-backoff retries and a
//! composite health aggregator. External adapter calls go through
//! [`guarded`], which composes a breaker with retry so callers only see
//! the final outcome.

pub mod circuit_breaker;
pub mod health;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use health::{ComponentHealth, HealthAggregator, HealthProbe, HealthState, SystemHealth};
pub use retry::{retry, retry_value, RetryConfig, RetryResult};

use relops_common::{Error, Result};
use std::future::Future;

/// Execute an operation behind a circuit breaker with retries.
///
/// An open breaker rejects the call outright; otherwise the operation is
/// retried per `retry_config` and the final outcome is recorded on the
/// breaker. Intermediate attempts stay invisible to the caller.
pub async fn guarded<T, F, Fut>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !breaker.can_execute() {
        return Err(Error::Unavailable(format!(
            "circuit breaker '{}' is open",
            breaker.name()
        )));
    }

    let result = retry::retry_value(operation_name, retry_config, operation).await;
    match &result {
        Ok(_) => breaker.record_success(),
        Err(_) => breaker.record_failure(),
    }
    result
}
