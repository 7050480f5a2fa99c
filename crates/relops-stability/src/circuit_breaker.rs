//! Circuit breaker implementation for fault tolerance
//!
//! Implements the circuit breaker pattern to prevent cascading failures
//! and provide fast failure responses when a telemetry dependency is
//! unhealthy. One breaker per dependency name, managed by
//! [`BreakerRegistry`].

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation, requests allowed
    Closed,
    /// Failing fast, requests rejected
    Open,
    /// Testing whether the dependency recovered
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting a probe call
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_state_change: Instant,
}

/// Three-state gate protecting a single external dependency.
///
/// The threshold check and the resulting transition happen under one lock
/// so concurrent `can_execute`/`record_*` calls cannot observe a torn
/// state.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with default settings (5 failures open the
    /// circuit, 60 s before half-open, 2 successes close it)
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, BreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_state_change: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a request may be executed. In the open state this
    /// transitions to half-open once the timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => true,
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;

        if inner.state == BreakerState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                self.transition(&mut inner, BreakerState::Closed);
                inner.success_count = 0;
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.success_count = 0;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            BreakerState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    /// Current state, without side effects
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Snapshot of the breaker for status reporting
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            seconds_since_change: inner.last_state_change.elapsed().as_secs(),
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = Instant::now();
        match to {
            BreakerState::Open => warn!(
                "Circuit breaker '{}' opened after {} failures ({} -> {})",
                self.name, inner.failure_count, from, to
            ),
            _ => info!("Circuit breaker '{}': {} -> {}", self.name, from, to),
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub seconds_since_change: u64,
}

/// Manages circuit breakers for the different telemetry dependencies
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a breaker for a dependency name
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name)))
            .clone()
    }

    /// Snapshots of all breakers, keyed by dependency name
    pub fn status(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect()
    }

    /// Which dependencies are currently admitting calls (closed or half-open)
    pub fn availability(&self) -> HashMap<String, bool> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| {
                let state = breaker.state();
                (
                    name.clone(),
                    state == BreakerState::Closed || state == BreakerState::HalfOpen,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::with_config("prometheus", quick_config());

        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), BreakerState::Closed);
        }
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn success_resets_failure_count_in_closed() {
        let cb = CircuitBreaker::with_config("loki", quick_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn full_cycle_open_half_open_closed_then_reopen() {
        let cb = CircuitBreaker::with_config("kubernetes", quick_config());

        // 5 failures -> open
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_execute());

        // timeout elapses -> next CanExecute admits and goes half-open
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        // 2 successes -> closed
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);

        // a failure in half-open goes straight back to open
        for _ in 0..5 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn registry_reuses_breakers() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("prometheus");
        let b = registry.get_or_create("prometheus");
        assert!(Arc::ptr_eq(&a, &b));

        a.record_failure();
        assert_eq!(registry.status()["prometheus"].failure_count, 1);
        assert!(registry.availability()["prometheus"]);
    }
}
