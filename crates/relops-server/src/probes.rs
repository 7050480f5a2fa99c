//! Health probes for the composite health endpoint

use async_trait::async_trait;
use relops_adapters::{ClusterAdapter, LogAdapter, MetricsAdapter};
use relops_stability::{ComponentHealth, HealthProbe, HealthState};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

/// Database connectivity probe
pub struct DatabaseProbe {
    pool: PgPool,
}

impl DatabaseProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> ComponentHealth {
        let started = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ComponentHealth::new("database", HealthState::Healthy, "Database connection OK"),
            Err(e) => ComponentHealth::new(
                "database",
                HealthState::Unhealthy,
                format!("Database ping failed: {e}"),
            ),
        }
        .with_response_time(started.elapsed())
    }
}

/// Metrics store probe
pub struct MetricsProbe {
    adapter: Arc<dyn MetricsAdapter>,
}

impl MetricsProbe {
    pub fn new(adapter: Arc<dyn MetricsAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl HealthProbe for MetricsProbe {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn check(&self) -> ComponentHealth {
        let started = Instant::now();
        match self.adapter.health().await {
            Ok(state) => ComponentHealth::new("prometheus", state, "Prometheus OK"),
            Err(e) => ComponentHealth::new(
                "prometheus",
                HealthState::Unhealthy,
                format!("Prometheus unreachable: {e}"),
            ),
        }
        .with_response_time(started.elapsed())
    }
}

/// Log aggregator probe; initialization shows up as degraded
pub struct LogsProbe {
    adapter: Arc<dyn LogAdapter>,
}

impl LogsProbe {
    pub fn new(adapter: Arc<dyn LogAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl HealthProbe for LogsProbe {
    fn name(&self) -> &str {
        "loki"
    }

    async fn check(&self) -> ComponentHealth {
        let started = Instant::now();
        match self.adapter.health().await {
            Ok(HealthState::Degraded) => ComponentHealth::new(
                "loki",
                HealthState::Degraded,
                "Loki initializing (ring startup)",
            ),
            Ok(state) => ComponentHealth::new("loki", state, "Loki OK"),
            Err(e) => {
                ComponentHealth::new("loki", HealthState::Unhealthy, format!("Loki unreachable: {e}"))
            }
        }
        .with_response_time(started.elapsed())
    }
}

/// Cluster API probe; only registered when cluster access is enabled
pub struct ClusterProbe {
    adapter: Arc<dyn ClusterAdapter>,
}

impl ClusterProbe {
    pub fn new(adapter: Arc<dyn ClusterAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl HealthProbe for ClusterProbe {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn check(&self) -> ComponentHealth {
        let started = Instant::now();
        match self.adapter.health().await {
            Ok(state) => ComponentHealth::new("kubernetes", state, "Cluster API OK"),
            Err(e) => ComponentHealth::new(
                "kubernetes",
                HealthState::Unhealthy,
                format!("Cluster API unreachable: {e}"),
            ),
        }
        .with_response_time(started.elapsed())
    }
}
