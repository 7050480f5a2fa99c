//! Root-cause classes and their remediation action catalogs
//!
//! Each class maps to a fixed set of candidate actions with a priority,
//! a confidence score and the parameters the executor needs. Confidence
//! here is about how well the action matches the diagnosed cause, not
//! about whether it will succeed.

use relops_common::{NewRecoveryAction, Severity};
use serde_json::json;

/// Root-cause types a diagnosis can yield
pub const CAUSE_POD_CRASH: &str = "pod_crash";
pub const CAUSE_POD_UNHEALTHY: &str = "pod_unhealthy";
pub const CAUSE_HIGH_ERROR_RATE: &str = "high_error_rate";
pub const CAUSE_METRIC_ANOMALY: &str = "metric_anomaly";
pub const CAUSE_MEMORY_LEAK: &str = "memory_leak";
pub const CAUSE_LOG_PATTERN: &str = "log_pattern";
pub const CAUSE_DEPLOYMENT_ISSUE: &str = "deployment_issue";
pub const CAUSE_CRITICAL_ISSUE: &str = "critical_issue";
pub const CAUSE_DEGRADATION: &str = "degradation";
pub const CAUSE_UNKNOWN: &str = "unknown";

/// Action types the executor understands (the cluster-backed subset) or
/// records for operator tooling
pub const ACTION_RESTART_POD: &str = "restart_pod";
pub const ACTION_SCALE_DEPLOYMENT: &str = "scale_deployment";
pub const ACTION_CLEAN_POD_LOGS: &str = "clean_pod_logs";
pub const ACTION_ENABLE_CIRCUIT_BREAKER: &str = "enable_circuit_breaker";
pub const ACTION_REDUCE_TRAFFIC: &str = "reduce_traffic";
pub const ACTION_RESTART_SERVICE: &str = "restart_service";
pub const ACTION_ROLLBACK_DEPLOYMENT: &str = "rollback_deployment";
pub const ACTION_CLEAR_CACHE: &str = "clear_cache";
pub const ACTION_PAUSE_DEPLOYMENTS: &str = "pause_deployments";
pub const ACTION_EMERGENCY_ROLLBACK: &str = "emergency_rollback";
pub const ACTION_ENABLE_DEBUG_LOGGING: &str = "enable_debug_logging";
pub const ACTION_INCREASE_MONITORING: &str = "increase_monitoring";

/// Candidate actions for a root-cause type
pub fn actions_for_cause(root_cause_type: &str) -> Vec<NewRecoveryAction> {
    match root_cause_type {
        CAUSE_POD_CRASH | CAUSE_POD_UNHEALTHY => pod_actions(),
        CAUSE_HIGH_ERROR_RATE | CAUSE_METRIC_ANOMALY => metric_actions(),
        CAUSE_MEMORY_LEAK | CAUSE_LOG_PATTERN => application_actions(),
        CAUSE_DEPLOYMENT_ISSUE => deployment_actions(),
        _ => generic_actions(),
    }
}

fn pod_actions() -> Vec<NewRecoveryAction> {
    vec![
        NewRecoveryAction {
            title: "Restart Failed Pod".to_string(),
            description: "Restart the workload so the deployment controller replaces the failed pod"
                .to_string(),
            action_type: ACTION_RESTART_POD.to_string(),
            priority: Severity::Critical,
            root_cause_match: "Pod is in CrashLoopBackOff or Failed state".to_string(),
            confidence_score: 0.95,
            parameters: json!({
                "wait_for_restart": true,
                "timeout_seconds": 60,
            }),
        },
        NewRecoveryAction {
            title: "Scale Up Deployment".to_string(),
            description: "Increase replica count to distribute load and absorb pod failures"
                .to_string(),
            action_type: ACTION_SCALE_DEPLOYMENT.to_string(),
            priority: Severity::High,
            root_cause_match: "Single pod is critical for service".to_string(),
            confidence_score: 0.85,
            parameters: json!({
                "scale_factor": 1.5,
                "min_replicas": 2,
            }),
        },
        NewRecoveryAction {
            title: "Clean Pod Logs".to_string(),
            description: "Clear old logs from pod containers to free up disk space".to_string(),
            action_type: ACTION_CLEAN_POD_LOGS.to_string(),
            priority: Severity::Medium,
            root_cause_match: "Pod disk space exhausted or log accumulation".to_string(),
            confidence_score: 0.75,
            parameters: json!({
                "max_log_age_hours": 24,
            }),
        },
    ]
}

fn metric_actions() -> Vec<NewRecoveryAction> {
    vec![
        NewRecoveryAction {
            title: "Enable Circuit Breaker".to_string(),
            description: "Activate a circuit breaker in front of the degraded service".to_string(),
            action_type: ACTION_ENABLE_CIRCUIT_BREAKER.to_string(),
            priority: Severity::Critical,
            root_cause_match: "High error rate detected, prevent cascading failures".to_string(),
            confidence_score: 0.92,
            parameters: json!({
                "failure_threshold": 0.5,
                "timeout_seconds": 30,
                "half_open_requests": 5,
            }),
        },
        NewRecoveryAction {
            title: "Auto-scale Service".to_string(),
            description: "Increase the number of service replicas to handle load".to_string(),
            action_type: ACTION_SCALE_DEPLOYMENT.to_string(),
            priority: Severity::High,
            root_cause_match: "High latency or error rate due to resource constraints".to_string(),
            confidence_score: 0.88,
            parameters: json!({
                "scale_factor": 2.0,
                "max_replicas": 10,
            }),
        },
        NewRecoveryAction {
            title: "Reduce Ingress Traffic".to_string(),
            description: "Temporarily reduce traffic to the service to allow recovery".to_string(),
            action_type: ACTION_REDUCE_TRAFFIC.to_string(),
            priority: Severity::High,
            root_cause_match: "Service overwhelmed with traffic".to_string(),
            confidence_score: 0.85,
            parameters: json!({
                "traffic_reduction_percent": 50,
                "duration_seconds": 300,
            }),
        },
    ]
}

fn application_actions() -> Vec<NewRecoveryAction> {
    vec![
        NewRecoveryAction {
            title: "Restart Service".to_string(),
            description: "Rolling-restart the service containers to clear leaked state".to_string(),
            action_type: ACTION_RESTART_SERVICE.to_string(),
            priority: Severity::High,
            root_cause_match: "Memory leak or recurring failure pattern in application logs"
                .to_string(),
            confidence_score: 0.90,
            parameters: json!({
                "rolling_restart": true,
                "grace_period_seconds": 30,
            }),
        },
        NewRecoveryAction {
            title: "Rollback Deployment".to_string(),
            description: "Revert to the previous stable version of the deployment".to_string(),
            action_type: ACTION_ROLLBACK_DEPLOYMENT.to_string(),
            priority: Severity::Critical,
            root_cause_match: "Issue started after a recent deployment".to_string(),
            confidence_score: 0.88,
            parameters: json!({
                "verify_health": true,
            }),
        },
        NewRecoveryAction {
            title: "Clear Application Cache".to_string(),
            description: "Flush the in-memory cache and restart the cache layer".to_string(),
            action_type: ACTION_CLEAR_CACHE.to_string(),
            priority: Severity::Medium,
            root_cause_match: "Cache corruption detected in logs".to_string(),
            confidence_score: 0.80,
            parameters: json!({
                "flush_mode": "all",
            }),
        },
    ]
}

fn deployment_actions() -> Vec<NewRecoveryAction> {
    vec![
        NewRecoveryAction {
            title: "Pause New Deployments".to_string(),
            description: "Stop new deployments to prevent further service disruption".to_string(),
            action_type: ACTION_PAUSE_DEPLOYMENTS.to_string(),
            priority: Severity::Critical,
            root_cause_match: "Deployment change caused the incident".to_string(),
            confidence_score: 0.93,
            parameters: json!({
                "pause_duration_seconds": 600,
            }),
        },
        NewRecoveryAction {
            title: "Emergency Rollback".to_string(),
            description: "Immediately roll back to the last known stable version".to_string(),
            action_type: ACTION_EMERGENCY_ROLLBACK.to_string(),
            priority: Severity::Critical,
            root_cause_match: "Deployment issue causing a critical outage".to_string(),
            confidence_score: 0.95,
            parameters: json!({
                "wait_for_health": true,
            }),
        },
    ]
}

fn generic_actions() -> Vec<NewRecoveryAction> {
    vec![
        NewRecoveryAction {
            title: "Enable Debug Logging".to_string(),
            description: "Enable verbose logging to understand the incident better".to_string(),
            action_type: ACTION_ENABLE_DEBUG_LOGGING.to_string(),
            priority: Severity::Medium,
            root_cause_match: "Need more information to diagnose the root cause".to_string(),
            confidence_score: 0.70,
            parameters: json!({
                "log_level": "DEBUG",
                "duration_seconds": 300,
            }),
        },
        NewRecoveryAction {
            title: "Increase Monitoring Granularity".to_string(),
            description: "Collect more detailed metrics and traces for analysis".to_string(),
            action_type: ACTION_INCREASE_MONITORING.to_string(),
            priority: Severity::Medium,
            root_cause_match: "Insufficient monitoring data".to_string(),
            confidence_score: 0.68,
            parameters: json!({
                "metric_interval_seconds": 5,
                "trace_sample_rate": 0.5,
            }),
        },
    ]
}
