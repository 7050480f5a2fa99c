//! Composite health checking across system dependencies
//!
//! Probes run concurrently, each under a fixed deadline. The overall
//! status is healthy only when every component is healthy, unhealthy only
//! when every component is unhealthy, and degraded otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::warn;

/// Per-probe deadline
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health of a component or of the system as a whole
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Health of a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthState,
    pub message: String,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: u64,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthState, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            last_checked: Utc::now(),
            response_time_ms: 0,
        }
    }

    pub fn with_response_time(mut self, elapsed: Duration) -> Self {
        self.response_time_ms = elapsed.as_millis() as u64;
        self
    }
}

/// Overall system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub components: HashMap<String, ComponentHealth>,
    pub uptime_seconds: u64,
}

/// A single registered health probe
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

/// Runs registered probes concurrently and rolls their states up
pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    started: Instant,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self {
            probes: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn register(&mut self, probe: Arc<dyn HealthProbe>) {
        self.probes.push(probe);
    }

    /// Run every probe under [`PROBE_TIMEOUT`] and aggregate
    pub async fn check(&self) -> SystemHealth {
        let checks = self.probes.iter().map(|probe| {
            let probe = probe.clone();
            async move {
                let started = Instant::now();
                match timeout(PROBE_TIMEOUT, probe.check()).await {
                    Ok(health) => health,
                    Err(_) => {
                        warn!("Health probe '{}' timed out", probe.name());
                        ComponentHealth::new(
                            probe.name(),
                            HealthState::Unhealthy,
                            format!("probe timed out after {:?}", PROBE_TIMEOUT),
                        )
                        .with_response_time(started.elapsed())
                    }
                }
            }
        });

        let components: HashMap<String, ComponentHealth> = join_all(checks)
            .await
            .into_iter()
            .map(|health| (health.name.clone(), health))
            .collect();

        SystemHealth {
            status: overall_status(&components),
            timestamp: Utc::now(),
            components,
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn overall_status(components: &HashMap<String, ComponentHealth>) -> HealthState {
    if components.is_empty() {
        return HealthState::Unknown;
    }

    let unhealthy = components
        .values()
        .filter(|c| c.status == HealthState::Unhealthy)
        .count();
    let healthy = components
        .values()
        .filter(|c| c.status == HealthState::Healthy)
        .count();

    if healthy == components.len() {
        HealthState::Healthy
    } else if unhealthy == components.len() {
        HealthState::Unhealthy
    } else {
        HealthState::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        name: String,
        status: HealthState,
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self) -> ComponentHealth {
            ComponentHealth::new(self.name.clone(), self.status, "fixed")
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn check(&self) -> ComponentHealth {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ComponentHealth::new("hanging", HealthState::Healthy, "never returned")
        }
    }

    fn aggregator_with(states: &[(&str, HealthState)]) -> HealthAggregator {
        let mut aggregator = HealthAggregator::new();
        for (name, status) in states {
            aggregator.register(Arc::new(FixedProbe {
                name: name.to_string(),
                status: *status,
            }));
        }
        aggregator
    }

    #[tokio::test]
    async fn all_healthy_is_healthy() {
        let aggregator = aggregator_with(&[
            ("database", HealthState::Healthy),
            ("prometheus", HealthState::Healthy),
        ]);
        assert_eq!(aggregator.check().await.status, HealthState::Healthy);
    }

    #[tokio::test]
    async fn all_unhealthy_is_unhealthy() {
        let aggregator = aggregator_with(&[
            ("database", HealthState::Unhealthy),
            ("prometheus", HealthState::Unhealthy),
        ]);
        assert_eq!(aggregator.check().await.status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn mixed_states_are_degraded() {
        let aggregator = aggregator_with(&[
            ("database", HealthState::Healthy),
            ("loki", HealthState::Degraded),
        ]);
        let health = aggregator.check().await;
        assert_eq!(health.status, HealthState::Degraded);
        assert_eq!(health.components.len(), 2);
    }

    #[tokio::test]
    async fn empty_aggregator_is_unknown() {
        let aggregator = HealthAggregator::new();
        assert_eq!(aggregator.check().await.status, HealthState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_maps_to_unhealthy() {
        let mut aggregator = HealthAggregator::new();
        aggregator.register(Arc::new(HangingProbe));
        let health = aggregator.check().await;
        assert_eq!(health.components["hanging"].status, HealthState::Unhealthy);
    }
}
