//! Recovery action workflow
//!
//! `suggest_actions` diagnoses an incident's root-cause type from its
//! persisted correlations, expands the matching catalog into persisted
//! suggestions, and returns them ranked. Actions must be approved before
//! `execute` will run them; execution outcomes are recorded on the row
//! either way.

use relops_adapters::{ClusterAccess, ClusterAdapter};
use relops_common::{
    Correlation, CorrelationKind, Error, Incident, RecoveryAction, RecoveryActionStatus, Result,
    Severity,
};
use relops_store::RecoveryStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog;

/// Error-rate percentage above which the diagnosis is high_error_rate
const ERROR_RATE_CAUSE_PCT: f64 = 10.0;

/// Scaling defaults when an action's parameters omit them
const DEFAULT_SCALE_FACTOR: f64 = 1.5;
const DEFAULT_MIN_REPLICAS: i64 = 2;
const DEFAULT_MAX_REPLICAS: i64 = 10;

/// Result of a suggestion pass
#[derive(Debug, Clone, Serialize)]
pub struct RecoverySuggestion {
    pub incident_id: Uuid,
    pub root_cause_type: String,
    pub actions: Vec<RecoveryAction>,
}

/// Manages recovery action suggestions, approval and execution
pub struct RecoveryActionService {
    store: Arc<dyn RecoveryStore>,
    cluster: ClusterAccess,
}

impl RecoveryActionService {
    pub fn new(store: Arc<dyn RecoveryStore>, cluster: ClusterAccess) -> Self {
        Self { store, cluster }
    }

    /// Diagnose the incident and persist the matching candidate actions
    /// with status suggested
    pub async fn suggest_actions(&self, incident_id: Uuid) -> Result<RecoverySuggestion> {
        let incident = self
            .store
            .incident(incident_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("incident {incident_id}")))?;
        let correlations = self.store.correlations(incident_id).await?;

        let root_cause_type = determine_root_cause_type(&incident, &correlations);
        info!(
            "Generating recovery action suggestions for incident {incident_id} \
             (root cause type: {root_cause_type})"
        );

        let candidates = catalog::actions_for_cause(root_cause_type);
        let actions = self
            .store
            .insert_recovery_actions(incident_id, &candidates)
            .await?;

        Ok(RecoverySuggestion {
            incident_id,
            root_cause_type: root_cause_type.to_string(),
            actions,
        })
    }

    /// Persisted actions for an incident, highest priority first
    pub async fn actions_for(&self, incident_id: Uuid) -> Result<Vec<RecoveryAction>> {
        self.store.recovery_actions(incident_id).await
    }

    /// Mark a suggested action as approved
    pub async fn approve(&self, action_id: Uuid, approved_by: &str) -> Result<RecoveryAction> {
        self.store
            .approve_recovery_action(action_id, approved_by)
            .await?
            .ok_or_else(|| Error::NotFound(format!("recovery action {action_id}")))
    }

    /// Execute an approved action. The outcome (completed or failed, with
    /// a result message) is recorded on the row; execution failures also
    /// surface to the caller.
    pub async fn execute(&self, action_id: Uuid, executed_by: &str) -> Result<RecoveryAction> {
        let action = self
            .store
            .recovery_action(action_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("recovery action {action_id}")))?;

        if action.status != RecoveryActionStatus::Approved {
            return Err(Error::Validation(format!(
                "can only execute approved actions, current status: {}",
                action.status
            )));
        }

        info!(
            "Executing recovery action {action_id} ({}) for incident {}",
            action.action_type, action.incident_id
        );
        let outcome = self.run_action(&action).await;

        let (status, message) = match &outcome {
            Ok(message) => (RecoveryActionStatus::Completed, message.clone()),
            Err(e) => (RecoveryActionStatus::Failed, e.to_string()),
        };
        if let Err(e) = self
            .store
            .record_recovery_execution(action_id, status, executed_by, &message)
            .await
        {
            warn!("Failed to record execution outcome for action {action_id}: {e}");
        }

        outcome?;
        self.store
            .recovery_action(action_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("recovery action {action_id} vanished")))
    }

    async fn run_action(&self, action: &RecoveryAction) -> Result<String> {
        match action.action_type.as_str() {
            catalog::ACTION_RESTART_POD | catalog::ACTION_RESTART_SERVICE => {
                let adapter = self.cluster_adapter()?;
                let (namespace, deployment) = self.action_target(action).await?;
                adapter.restart_deployment(&namespace, &deployment).await?;
                Ok(format!("rollout restart issued for deployment {deployment}"))
            }
            catalog::ACTION_SCALE_DEPLOYMENT => {
                let adapter = self.cluster_adapter()?;
                let (namespace, deployment) = self.action_target(action).await?;

                let current = adapter
                    .deployments(&namespace, &deployment)
                    .await?
                    .first()
                    .map(|d| d.desired_replicas.max(1))
                    .unwrap_or(1);
                let factor = action
                    .parameters
                    .get("scale_factor")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(DEFAULT_SCALE_FACTOR);
                let min = action
                    .parameters
                    .get("min_replicas")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(DEFAULT_MIN_REPLICAS) as i32;
                let max = (action
                    .parameters
                    .get("max_replicas")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(DEFAULT_MAX_REPLICAS) as i32)
                    .max(min);
                let target = ((current as f64 * factor).ceil() as i32).clamp(min, max);

                adapter.scale_deployment(&namespace, &deployment, target).await?;
                Ok(format!(
                    "deployment {deployment} scaled from {current} to {target} replicas"
                ))
            }
            other => Err(Error::Validation(format!(
                "action type '{other}' requires operator tooling and cannot be executed here"
            ))),
        }
    }

    fn cluster_adapter(&self) -> Result<&Arc<dyn ClusterAdapter>> {
        self.cluster
            .adapter()
            .ok_or_else(|| Error::Unavailable("cluster integration not configured".to_string()))
    }

    /// Namespace and deployment an action operates on: explicit
    /// parameters win, otherwise the incident's service name
    async fn action_target(&self, action: &RecoveryAction) -> Result<(String, String)> {
        let namespace = action
            .parameters
            .get("namespace")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string();

        if let Some(deployment) = action.parameters.get("deployment").and_then(|v| v.as_str()) {
            return Ok((namespace, deployment.to_string()));
        }

        let incident = self
            .store
            .incident(action.incident_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("incident {}", action.incident_id)))?;
        let service = incident.service.unwrap_or_default();
        if service.is_empty() {
            return Err(Error::Validation(
                "no deployment target: the incident has no service and the action names none"
                    .to_string(),
            ));
        }
        Ok((namespace, service))
    }
}

/// Map an incident's persisted evidence onto a root-cause class. Checked
/// in order: unhealthy pods, log patterns (memory first), error rate,
/// then a severity fallback.
fn determine_root_cause_type(incident: &Incident, correlations: &[Correlation]) -> &'static str {
    for correlation in correlations {
        if correlation.kind == CorrelationKind::Infrastructure {
            let status = correlation
                .details
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if status != "Running" {
                return catalog::CAUSE_POD_CRASH;
            }
        }
    }

    let mut saw_pattern = false;
    for correlation in correlations {
        if correlation.kind == CorrelationKind::LogPattern {
            saw_pattern = true;
            let pattern = correlation
                .details
                .get("pattern")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_lowercase();
            if pattern.contains("memory") || pattern.contains("oom") {
                return catalog::CAUSE_MEMORY_LEAK;
            }
        }
    }
    if saw_pattern {
        return catalog::CAUSE_LOG_PATTERN;
    }

    for correlation in correlations {
        if correlation.kind == CorrelationKind::Metric && correlation.source_id == "error_rate" {
            let value = correlation
                .details
                .get("value")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            if value > ERROR_RATE_CAUSE_PCT {
                return catalog::CAUSE_HIGH_ERROR_RATE;
            }
        }
    }

    match incident.severity {
        Severity::Critical => catalog::CAUSE_CRITICAL_ISSUE,
        Severity::High => catalog::CAUSE_METRIC_ANOMALY,
        Severity::Medium => catalog::CAUSE_DEGRADATION,
        Severity::Low => catalog::CAUSE_UNKNOWN,
    }
}
