//! External telemetry adapters for the relops incident core
//!
//! Three capability interfaces consumed by the detection, correlation and
//! investigation subsystems: a Prometheus-compatible metrics store, a
//! Loki-compatible log aggregator and a Kubernetes-compatible container
//! orchestrator. Every adapter honors a per-call deadline and fails with
//! a structured error category; transient failures are retried behind a
//! circuit breaker, invisibly to callers.

pub mod kubernetes;
pub mod loki;
pub mod prometheus;

pub use kubernetes::KubeAdapter;
pub use loki::LokiAdapter;
pub use prometheus::PrometheusAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relops_common::Result;
use relops_stability::HealthState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Deadline for query-style adapter calls
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for health probes
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// One instant-query result: a label vector with its sampled value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub timestamp: f64,
}

/// One range-query result: a label vector with its sample series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSeries {
    pub labels: HashMap<String, String>,
    /// (unix seconds, value) pairs
    pub values: Vec<(f64, f64)>,
}

/// A single log line with its stream labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub labels: HashMap<String, String>,
}

/// Observed state of a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodState {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub restarts: i32,
    pub last_restart: Option<DateTime<Utc>>,
}

/// Observed state of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
}

/// A cluster event attached to an object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub reason: String,
    pub message: String,
    pub object: String,
    pub namespace: String,
    pub event_type: String,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Aggregate cluster view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub total_pods: usize,
    pub running_pods: usize,
    pub failed_pods: usize,
    pub pending_pods: usize,
    pub pods: Vec<PodState>,
    pub last_check: DateTime<Utc>,
}

/// Capability interface over a Prometheus-compatible metrics store
#[async_trait]
pub trait MetricsAdapter: Send + Sync {
    /// Execute an instant query; unparsable sample values are skipped
    async fn query(&self, query: &str, at: Option<DateTime<Utc>>) -> Result<Vec<MetricSample>>;

    /// Execute a range query
    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<RangeSeries>>;

    /// 5xx rate over total request rate for a service, in percent
    async fn error_rate(&self, service: &str) -> Result<f64>;

    /// p95 request latency for a service, in milliseconds
    async fn latency_p95(&self, service: &str) -> Result<f64>;

    /// Request rate for a service, in requests per second
    async fn request_rate(&self, service: &str) -> Result<f64>;

    /// 5xx share of total requests over the last five minutes, in [0, 1]
    async fn error_ratio(&self, service: &str) -> Result<f64>;

    /// Share of non-5xx requests over an N-day window, in percent
    async fn availability(&self, service: &str, window_days: u32) -> Result<f64>;

    /// Push a counter sample through the push sink; a missing sink is not
    /// an error (the metric will be scraped instead)
    async fn push_counter(
        &self,
        name: &str,
        value: f64,
        labels: &HashMap<String, String>,
    ) -> Result<()>;

    /// Push a histogram observation through the push sink
    async fn push_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &HashMap<String, String>,
    ) -> Result<()>;

    /// Probe the store's health endpoint
    async fn health(&self) -> Result<HealthState>;
}

/// Capability interface over a Loki-compatible log aggregator
#[async_trait]
pub trait LogAdapter: Send + Sync {
    /// Fetch error-level log entries for a service since a point in time
    async fn error_logs(
        &self,
        service: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>>;

    /// Detect recurring patterns in a service's recent logs
    async fn detect_patterns(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, u64>>;

    /// Push a log line for a service
    async fn push_log(
        &self,
        service: &str,
        level: &str,
        message: &str,
        labels: &HashMap<String, String>,
    ) -> Result<()>;

    /// Short human-readable hint at the dominant failure pattern over a
    /// trailing window
    async fn root_cause_hint(&self, service: &str, window: Duration) -> Result<String>;

    /// Probe the aggregator; a 503 during ring startup maps to degraded
    async fn health(&self) -> Result<HealthState>;
}

/// Capability interface over a Kubernetes-compatible orchestrator
#[async_trait]
pub trait ClusterAdapter: Send + Sync {
    /// Pods in a namespace, optionally filtered to a service ("all" or an
    /// empty string disables the filter)
    async fn pods(&self, namespace: &str, service: &str) -> Result<Vec<PodState>>;

    async fn deployments(&self, namespace: &str, service: &str) -> Result<Vec<DeploymentState>>;

    async fn events(
        &self,
        namespace: &str,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClusterEvent>>;

    async fn restart_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    async fn cluster_status(&self) -> Result<ClusterSummary>;

    async fn health(&self) -> Result<HealthState>;
}

/// Cluster capability that may be absent.
///
/// The orchestrator is optional at deployment time; holding an explicit
/// disabled variant (rather than a nullable adapter) guarantees no method
/// is ever invoked on an absent adapter and lets callers surface a
/// "not available" marker instead.
#[derive(Clone)]
pub enum ClusterAccess {
    Enabled(Arc<dyn ClusterAdapter>),
    Disabled,
}

impl ClusterAccess {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ClusterAccess::Enabled(_))
    }

    pub fn adapter(&self) -> Option<&Arc<dyn ClusterAdapter>> {
        match self {
            ClusterAccess::Enabled(adapter) => Some(adapter),
            ClusterAccess::Disabled => None,
        }
    }
}

/// Map a reqwest transport failure onto the structured error categories
pub(crate) fn map_transport_error(source: &str, err: reqwest::Error) -> relops_common::Error {
    use relops_common::Error;

    if err.is_timeout() {
        Error::Timeout(format!("{source} request timed out: {err}"))
    } else if err.is_connect() {
        Error::Unreachable(format!("{source} unreachable: {err}"))
    } else {
        Error::Adapter(format!("{source} request failed: {err}"))
    }
}

/// Map a non-success HTTP status onto the structured error categories
pub(crate) fn map_status_error(
    source: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> relops_common::Error {
    use relops_common::Error;

    if status == reqwest::StatusCode::NOT_FOUND {
        Error::NotFound(format!("{source} returned 404: {body}"))
    } else if status.is_client_error() {
        if body.contains("parse error") {
            Error::InvalidQuery(format!("{source} rejected query: {body}"))
        } else {
            Error::Adapter(format!("{source} returned {status}: {body}"))
        }
    } else {
        Error::Upstream(format!("{source} returned {status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_categories() {
        let err = map_status_error("prometheus", reqwest::StatusCode::BAD_REQUEST, "parse error at char 3");
        assert_eq!(err.category(), "invalid_query");

        let err = map_status_error("prometheus", reqwest::StatusCode::NOT_FOUND, "");
        assert_eq!(err.category(), "not_found");

        let err = map_status_error("loki", reqwest::StatusCode::BAD_GATEWAY, "bad gateway");
        assert_eq!(err.category(), "upstream");
        assert!(err.is_retryable());
    }

    #[test]
    fn disabled_cluster_access_has_no_adapter() {
        let access = ClusterAccess::Disabled;
        assert!(!access.is_enabled());
        assert!(access.adapter().is_none());
    }
}
