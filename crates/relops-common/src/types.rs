//! Domain model for the incident core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for incidents
pub type IncidentId = Uuid;

/// Unique identifier for services
pub type ServiceId = Uuid;

/// Incident severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(Error::Internal(format!("unknown severity: {other}"))),
        }
    }
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Mitigated,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Mitigated => "mitigated",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "investigating" => Ok(IncidentStatus::Investigating),
            "mitigated" => Ok(IncidentStatus::Mitigated),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(Error::Internal(format!("unknown incident status: {other}"))),
        }
    }
}

/// Health status of a service under observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(ServiceStatus::Healthy),
            "degraded" => Ok(ServiceStatus::Degraded),
            "unhealthy" => Ok(ServiceStatus::Unhealthy),
            other => Err(Error::Internal(format!("unknown service status: {other}"))),
        }
    }
}

/// Detection rule kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Threshold,
    Anomaly,
    Pattern,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Threshold => "threshold",
            RuleKind::Anomaly => "anomaly",
            RuleKind::Pattern => "pattern",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(RuleKind::Threshold),
            "anomaly" => Ok(RuleKind::Anomaly),
            "pattern" => Ok(RuleKind::Pattern),
            other => Err(Error::Internal(format!("unknown rule kind: {other}"))),
        }
    }
}

/// Timeline event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    MetricAnomaly,
    LogPattern,
    K8sEvent,
    UserAction,
    AraLog,
    Correlation,
}

impl TimelineEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventKind::MetricAnomaly => "metric_anomaly",
            TimelineEventKind::LogPattern => "log_pattern",
            TimelineEventKind::K8sEvent => "k8s_event",
            TimelineEventKind::UserAction => "user_action",
            TimelineEventKind::AraLog => "ara_log",
            TimelineEventKind::Correlation => "correlation",
        }
    }
}

impl fmt::Display for TimelineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelineEventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metric_anomaly" => Ok(TimelineEventKind::MetricAnomaly),
            "log_pattern" => Ok(TimelineEventKind::LogPattern),
            "k8s_event" => Ok(TimelineEventKind::K8sEvent),
            "user_action" => Ok(TimelineEventKind::UserAction),
            "ara_log" => Ok(TimelineEventKind::AraLog),
            "correlation" => Ok(TimelineEventKind::Correlation),
            other => Err(Error::Internal(format!("unknown timeline event kind: {other}"))),
        }
    }
}

/// Correlation evidence kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    Infrastructure,
    Metric,
    Logs,
    LogPattern,
    Status,
}

impl CorrelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationKind::Infrastructure => "infrastructure",
            CorrelationKind::Metric => "metric",
            CorrelationKind::Logs => "logs",
            CorrelationKind::LogPattern => "log_pattern",
            CorrelationKind::Status => "status",
        }
    }
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "infrastructure" => Ok(CorrelationKind::Infrastructure),
            "metric" => Ok(CorrelationKind::Metric),
            "logs" => Ok(CorrelationKind::Logs),
            "log_pattern" => Ok(CorrelationKind::LogPattern),
            "status" => Ok(CorrelationKind::Status),
            other => Err(Error::Internal(format!("unknown correlation kind: {other}"))),
        }
    }
}

/// Telemetry signal sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Kubernetes,
    Prometheus,
    Loki,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Kubernetes => "kubernetes",
            SignalSource::Prometheus => "prometheus",
            SignalSource::Loki => "loki",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(SignalSource::Kubernetes),
            "prometheus" => Ok(SignalSource::Prometheus),
            "loki" => Ok(SignalSource::Loki),
            other => Err(Error::Internal(format!("unknown signal source: {other}"))),
        }
    }
}

/// A logical unit under observation, created on first reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A declarative detection check, loaded on every detection cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub kind: RuleKind,
    /// Query text, opaque to the core; interpreted by the metrics adapter
    pub query: String,
    pub threshold_value: f64,
    pub severity: Severity,
    pub service_id: Option<ServiceId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A materialized alert
///
/// Invariants: `resolved_at` is non-null iff `status` is resolved, and
/// `started_at <= resolved_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub service_id: Option<ServiceId>,
    /// Service name joined in on reads, for display and broadcast
    pub service: Option<String>,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new incident
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub service_id: Option<ServiceId>,
    pub started_at: DateTime<Utc>,
}

/// Partial update for an incident; resolution sets `resolved_at`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentPatch {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
}

/// Append-only audit row attached to an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub incident_id: IncidentId,
    pub event_type: TimelineEventKind,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending a timeline event
#[derive(Debug, Clone)]
pub struct NewTimelineEvent {
    pub incident_id: IncidentId,
    pub event_type: TimelineEventKind,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// A piece of evidence attached to an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub id: Uuid,
    pub incident_id: IncidentId,
    #[serde(rename = "type")]
    pub kind: CorrelationKind,
    pub source_type: SignalSource,
    pub source_id: String,
    pub confidence_score: f64,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a correlation row
#[derive(Debug, Clone, Serialize)]
pub struct NewCorrelation {
    #[serde(rename = "type")]
    pub kind: CorrelationKind,
    pub source_type: SignalSource,
    pub source_id: String,
    pub confidence_score: f64,
    pub details: serde_json::Value,
}

/// A scored root-cause hypothesis; exactly one primary per non-empty set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseCandidate {
    pub signal_type: CorrelationKind,
    pub source: SignalSource,
    pub reason: String,
    pub score: f64,
    pub primary: bool,
    pub signal_ids: Vec<String>,
}

/// Lifecycle of a recovery action: suggestions need explicit approval
/// before execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionStatus {
    Suggested,
    Approved,
    InProgress,
    Completed,
    Failed,
}

impl RecoveryActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryActionStatus::Suggested => "suggested",
            RecoveryActionStatus::Approved => "approved",
            RecoveryActionStatus::InProgress => "in_progress",
            RecoveryActionStatus::Completed => "completed",
            RecoveryActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecoveryActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryActionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggested" => Ok(RecoveryActionStatus::Suggested),
            "approved" => Ok(RecoveryActionStatus::Approved),
            "in_progress" => Ok(RecoveryActionStatus::InProgress),
            "completed" => Ok(RecoveryActionStatus::Completed),
            "failed" => Ok(RecoveryActionStatus::Failed),
            other => Err(Error::Internal(format!("unknown recovery action status: {other}"))),
        }
    }
}

/// A suggested or executed remediation action for an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: Uuid,
    pub incident_id: IncidentId,
    pub title: String,
    pub description: String,
    /// Free-form action kind (e.g. restart_pod, scale_deployment),
    /// interpreted by the recovery executor
    pub action_type: String,
    pub priority: Severity,
    pub status: RecoveryActionStatus,
    /// Why this action matches the diagnosed root cause
    pub root_cause_match: String,
    pub confidence_score: f64,
    pub parameters: serde_json::Value,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<String>,
    pub result: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a suggested recovery action
#[derive(Debug, Clone)]
pub struct NewRecoveryAction {
    pub title: String,
    pub description: String,
    pub action_type: String,
    pub priority: Severity,
    pub root_cause_match: String,
    pub confidence_score: f64,
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_wire_form() {
        for sev in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
            assert_eq!(sev.as_str().parse::<Severity>().unwrap(), sev);
        }
        for status in [
            IncidentStatus::Open,
            IncidentStatus::Investigating,
            IncidentStatus::Mitigated,
            IncidentStatus::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<IncidentStatus>().unwrap(), status);
        }
        assert_eq!(
            "log_pattern".parse::<CorrelationKind>().unwrap(),
            CorrelationKind::LogPattern
        );
        assert_eq!(
            "k8s_event".parse::<TimelineEventKind>().unwrap(),
            TimelineEventKind::K8sEvent
        );
        assert_eq!(
            "in_progress".parse::<RecoveryActionStatus>().unwrap(),
            RecoveryActionStatus::InProgress
        );
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(
            serde_json::from_str::<Severity>("\"high\"").unwrap(),
            Severity::High
        );
    }
}
