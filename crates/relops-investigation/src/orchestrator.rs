//! Investigation workflow
//!
//! Five phases per incident: metric analysis, log scan, infrastructure
//! scan, hypothesis synthesis and next-step generation. Every phase emits
//! a streamed log entry that is both persisted (as an `ara_log` timeline
//! event) and broadcast through the hub.

use chrono::Utc;
use relops_adapters::{ClusterAccess, LogAdapter, MetricsAdapter};
use relops_common::{NewTimelineEvent, TimelineEventKind};
use relops_realtime::RealtimeHub;
use relops_store::TimelineStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Error-ratio bound above which the metric phase reports a confirmed spike
const CONFIRMED_ERROR_RATIO: f64 = 0.05;

/// Error-ratio bound above which the hypothesis escalates to critical
const CRITICAL_ERROR_RATIO: f64 = 0.2;

/// Error-ratio bound above which dependency/stacktrace steps are suggested
const STEP_ERROR_RATIO: f64 = 0.01;

/// Trailing window for the log scan
const LOG_SCAN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Base and conditional hypothesis confidences
const BASE_CONFIDENCE: f64 = 0.70;
const CRITICAL_CONFIDENCE: f64 = 0.90;
const DATABASE_CONFIDENCE: f64 = 0.85;

/// The brain for autonomous investigations
pub struct AraOrchestrator {
    metrics: Arc<dyn MetricsAdapter>,
    logs: Arc<dyn LogAdapter>,
    cluster: ClusterAccess,
    store: Arc<dyn TimelineStore>,
    hub: RealtimeHub,
}

impl AraOrchestrator {
    pub fn new(
        metrics: Arc<dyn MetricsAdapter>,
        logs: Arc<dyn LogAdapter>,
        cluster: ClusterAccess,
        store: Arc<dyn TimelineStore>,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            metrics,
            logs,
            cluster,
            store,
            hub,
        }
    }

    /// Begin an autonomous investigation as a detached task
    pub fn start_investigation(self: Arc<Self>, incident_id: Uuid, service: String) {
        info!("Starting investigation for incident {incident_id} (service: {service})");
        tokio::spawn(async move {
            self.run_workflow(incident_id, &service).await;
        });
    }

    /// Run all phases; exposed for direct invocation in tests
    pub async fn run_workflow(&self, incident_id: Uuid, service: &str) {
        self.log_and_broadcast(
            incident_id,
            &format!("Autonomous investigation initialized for service: {service}"),
            None,
        )
        .await;

        // Phase 1: metric analysis
        self.log_and_broadcast(incident_id, "Phase 1: Analyzing metrics", None)
            .await;
        let error_ratio = match self.metrics.error_ratio(service).await {
            Ok(ratio) => ratio,
            Err(e) => {
                warn!("Metric phase failed for {service}: {e}");
                0.0
            }
        };
        if error_ratio > CONFIRMED_ERROR_RATIO {
            self.log_and_broadcast(
                incident_id,
                &format!("Confirmed high error rate: {:.1}%", error_ratio * 100.0),
                Some(json!({ "error_rate": error_ratio })),
            )
            .await;
        }

        // Phase 2: log scan
        self.log_and_broadcast(incident_id, "Phase 2: Scanning logs for patterns", None)
            .await;
        let hint = match self.logs.root_cause_hint(service, LOG_SCAN_WINDOW).await {
            Ok(hint) => hint,
            Err(e) => {
                warn!("Log phase failed for {service}: {e}");
                "Unable to determine pattern from logs".to_string()
            }
        };
        self.log_and_broadcast(
            incident_id,
            &format!("Log analysis completed: {hint}"),
            None,
        )
        .await;

        // Phase 3: infrastructure scan
        self.log_and_broadcast(incident_id, "Phase 3: Checking cluster state", None)
            .await;
        let pod_evidence = self.collect_pod_evidence(service).await;
        if pod_evidence.is_empty() {
            self.log_and_broadcast(
                incident_id,
                "No immediate infrastructure issues (pod restarts) found",
                None,
            )
            .await;
        } else {
            self.log_and_broadcast(
                incident_id,
                &format!("Infrastructure issue found: {pod_evidence}"),
                None,
            )
            .await;
        }

        // Phase 4: hypothesis synthesis
        self.log_and_broadcast(incident_id, "Phase 4: Synthesizing findings into a hypothesis", None)
            .await;
        let mut confidence = BASE_CONFIDENCE;
        let mut title = "Service degradation due to application errors".to_string();
        if error_ratio > CRITICAL_ERROR_RATIO {
            confidence = CRITICAL_CONFIDENCE;
            title = format!("Critical failure: service {service} is returning a high volume of errors");
        }
        if hint.to_lowercase().contains("database") {
            title = "Potential database connectivity issue".to_string();
            confidence = DATABASE_CONFIDENCE;
        }
        self.log_and_broadcast(
            incident_id,
            &format!("Hypothesis generated with {:.0}% confidence: {title}", confidence * 100.0),
            Some(json!({
                "kind": "hypothesis",
                "title": title,
                "confidence": confidence,
                "evidence": {
                    "error_rate": error_ratio,
                    "log_hint": hint,
                    "pod_evidence": pod_evidence,
                    "service": service,
                },
            })),
        )
        .await;

        // Phase 5: recommended next steps; never an empty list
        self.log_and_broadcast(incident_id, "Phase 5: Generating investigation steps", None)
            .await;
        let mut steps: Vec<(&str, String)> = Vec::new();
        if error_ratio > STEP_ERROR_RATIO {
            steps.push((
                "Check service dependencies",
                "Verify whether upstream and downstream services are healthy".to_string(),
            ));
            steps.push((
                "Analyze log stacktrace",
                format!("Examine full stacktraces in the log store for pattern: {hint}"),
            ));
        }
        if !pod_evidence.is_empty() {
            steps.push((
                "Inspect pod describe",
                "Describe the affected pods to check for OOM kills or abnormal exit codes".to_string(),
            ));
        }
        if steps.is_empty() {
            steps.push((
                "Manual verification",
                "Review dashboards and verify system health manually".to_string(),
            ));
        }
        for (step_title, step_description) in steps {
            self.log_and_broadcast(
                incident_id,
                &format!("Suggested step: {step_title}"),
                Some(json!({
                    "kind": "step",
                    "title": step_title,
                    "description": step_description,
                })),
            )
            .await;
        }

        self.log_and_broadcast(
            incident_id,
            "Investigation cycle completed. Standing by for operator instructions.",
            None,
        )
        .await;
    }

    /// Pods whose name contains the service and that have restarted
    async fn collect_pod_evidence(&self, service: &str) -> String {
        let Some(adapter) = self.cluster.adapter() else {
            return String::new();
        };
        match adapter.cluster_status().await {
            Ok(summary) => {
                let mut evidence = String::new();
                for pod in &summary.pods {
                    if (service == "all" || pod.name.contains(service)) && pod.restarts > 0 {
                        evidence.push_str(&format!(
                            "Pod {} in namespace {} has {} restarts. ",
                            pod.name, pod.namespace, pod.restarts
                        ));
                    }
                }
                evidence
            }
            Err(e) => {
                warn!("Infrastructure phase failed for {service}: {e}");
                String::new()
            }
        }
    }

    /// Persist a streamed investigation entry and broadcast it
    async fn log_and_broadcast(&self, incident_id: Uuid, message: &str, metadata: Option<Value>) {
        let created_at = Utc::now();
        let metadata = metadata.unwrap_or(Value::Null);

        if let Err(e) = self
            .store
            .append_timeline_event(NewTimelineEvent {
                incident_id,
                event_type: TimelineEventKind::AraLog,
                timestamp: created_at,
                source: "ara".to_string(),
                title: message.to_string(),
                description: message.to_string(),
                metadata: metadata.clone(),
            })
            .await
        {
            warn!("Failed to persist investigation log for {incident_id}: {e}");
        }

        self.hub
            .broadcast_ara_log(json!({
                "incident_id": incident_id,
                "message": message,
                "metadata": metadata,
                "created_at": created_at,
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use relops_adapters::{
        ClusterAdapter, ClusterEvent, ClusterSummary, DeploymentState, LogEntry, MetricSample,
        PodState, RangeSeries,
    };
    use relops_common::Result;
    use relops_stability::HealthState;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemoryTimeline {
        events: StdMutex<Vec<relops_common::TimelineEvent>>,
    }

    #[async_trait]
    impl TimelineStore for MemoryTimeline {
        async fn append_timeline_event(
            &self,
            event: NewTimelineEvent,
        ) -> Result<relops_common::TimelineEvent> {
            let stored = relops_common::TimelineEvent {
                id: Uuid::new_v4(),
                incident_id: event.incident_id,
                event_type: event.event_type,
                timestamp: event.timestamp,
                source: event.source,
                title: event.title,
                description: event.description,
                metadata: event.metadata,
                created_at: Utc::now(),
            };
            self.events.lock().unwrap().push(stored.clone());
            Ok(stored)
        }

        async fn timeline(&self, _incident_id: Uuid) -> Result<Vec<relops_common::TimelineEvent>> {
            Ok(self.events.lock().unwrap().clone())
        }
    }

    struct FixedMetrics {
        ratio: f64,
    }

    #[async_trait]
    impl MetricsAdapter for FixedMetrics {
        async fn query(&self, _q: &str, _at: Option<DateTime<Utc>>) -> Result<Vec<MetricSample>> {
            Ok(Vec::new())
        }

        async fn query_range(
            &self,
            _q: &str,
            _s: DateTime<Utc>,
            _e: DateTime<Utc>,
            _step: Duration,
        ) -> Result<Vec<RangeSeries>> {
            Ok(Vec::new())
        }

        async fn error_rate(&self, _service: &str) -> Result<f64> {
            Ok(self.ratio * 100.0)
        }

        async fn latency_p95(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn request_rate(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn error_ratio(&self, _service: &str) -> Result<f64> {
            Ok(self.ratio)
        }

        async fn availability(&self, _service: &str, _w: u32) -> Result<f64> {
            Ok(100.0)
        }

        async fn push_counter(&self, _n: &str, _v: f64, _l: &HashMap<String, String>) -> Result<()> {
            Ok(())
        }

        async fn push_histogram(
            &self,
            _n: &str,
            _v: f64,
            _l: &HashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    struct FixedLogs {
        hint: String,
    }

    #[async_trait]
    impl LogAdapter for FixedLogs {
        async fn error_logs(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<LogEntry>> {
            Ok(Vec::new())
        }

        async fn detect_patterns(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> Result<HashMap<String, u64>> {
            Ok(HashMap::new())
        }

        async fn push_log(
            &self,
            _service: &str,
            _level: &str,
            _message: &str,
            _labels: &HashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn root_cause_hint(&self, _service: &str, _window: Duration) -> Result<String> {
            Ok(self.hint.clone())
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    struct RestartingCluster;

    #[async_trait]
    impl ClusterAdapter for RestartingCluster {
        async fn pods(&self, _namespace: &str, _service: &str) -> Result<Vec<PodState>> {
            Ok(Vec::new())
        }

        async fn deployments(&self, _ns: &str, _svc: &str) -> Result<Vec<DeploymentState>> {
            Ok(Vec::new())
        }

        async fn events(
            &self,
            _ns: &str,
            _svc: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<ClusterEvent>> {
            Ok(Vec::new())
        }

        async fn restart_deployment(&self, _ns: &str, _name: &str) -> Result<()> {
            Ok(())
        }

        async fn scale_deployment(&self, _ns: &str, _name: &str, _replicas: i32) -> Result<()> {
            Ok(())
        }

        async fn cluster_status(&self) -> Result<ClusterSummary> {
            let pod = PodState {
                name: "payment-service-abc".to_string(),
                namespace: "default".to_string(),
                status: "Running".to_string(),
                restarts: 4,
                last_restart: None,
            };
            Ok(ClusterSummary {
                total_pods: 1,
                running_pods: 1,
                failed_pods: 0,
                pending_pods: 0,
                pods: vec![pod],
                last_check: Utc::now(),
            })
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    fn orchestrator(
        ratio: f64,
        hint: &str,
        cluster: ClusterAccess,
        store: Arc<MemoryTimeline>,
    ) -> AraOrchestrator {
        AraOrchestrator::new(
            Arc::new(FixedMetrics { ratio }),
            Arc::new(FixedLogs { hint: hint.to_string() }),
            cluster,
            store,
            RealtimeHub::new(),
        )
    }

    fn metadata_entries<'a>(
        events: &'a [relops_common::TimelineEvent],
        kind: &str,
    ) -> Vec<&'a relops_common::TimelineEvent> {
        events
            .iter()
            .filter(|e| e.metadata.get("kind").and_then(|k| k.as_str()) == Some(kind))
            .collect()
    }

    #[tokio::test]
    async fn quiet_system_still_emits_a_manual_step() {
        let store = Arc::new(MemoryTimeline::default());
        let ara = orchestrator(0.0, "No dominant error pattern found in recent logs", ClusterAccess::Disabled, store.clone());

        ara.run_workflow(Uuid::new_v4(), "payment-service").await;

        let events = store.events.lock().unwrap().clone();
        assert!(events
            .iter()
            .all(|e| e.event_type == TimelineEventKind::AraLog && e.source == "ara"));

        let steps = metadata_entries(&events, "step");
        assert_eq!(steps.len(), 1);
        assert!(steps[0].title.contains("Manual verification"));
    }

    #[tokio::test]
    async fn elevated_errors_add_dependency_and_stacktrace_steps() {
        let store = Arc::new(MemoryTimeline::default());
        let ara = orchestrator(0.06, "nothing of note", ClusterAccess::Disabled, store.clone());

        ara.run_workflow(Uuid::new_v4(), "payment-service").await;

        let events = store.events.lock().unwrap().clone();
        // Confirmed-error-rate entry from phase 1
        assert!(events.iter().any(|e| e.title.contains("Confirmed high error rate")));

        let steps = metadata_entries(&events, "step");
        assert_eq!(steps.len(), 2);

        let hypothesis = metadata_entries(&events, "hypothesis");
        assert_eq!(hypothesis.len(), 1);
        let confidence = hypothesis[0].metadata["confidence"].as_f64().unwrap();
        assert!((confidence - BASE_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn critical_ratio_escalates_hypothesis() {
        let store = Arc::new(MemoryTimeline::default());
        let ara = orchestrator(0.30, "nothing of note", ClusterAccess::Disabled, store.clone());

        ara.run_workflow(Uuid::new_v4(), "payment-service").await;

        let events = store.events.lock().unwrap().clone();
        let hypothesis = metadata_entries(&events, "hypothesis");
        assert_eq!(hypothesis.len(), 1);
        assert!(hypothesis[0].metadata["title"]
            .as_str()
            .unwrap()
            .starts_with("Critical failure"));
        let confidence = hypothesis[0].metadata["confidence"].as_f64().unwrap();
        assert!((confidence - CRITICAL_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn database_hint_overrides_hypothesis_title() {
        let store = Arc::new(MemoryTimeline::default());
        let ara = orchestrator(
            0.30,
            "Dominant error pattern: Database connection timeout (12 occurrences)",
            ClusterAccess::Disabled,
            store.clone(),
        );

        ara.run_workflow(Uuid::new_v4(), "payment-service").await;

        let events = store.events.lock().unwrap().clone();
        let hypothesis = metadata_entries(&events, "hypothesis");
        assert_eq!(
            hypothesis[0].metadata["title"].as_str().unwrap(),
            "Potential database connectivity issue"
        );
        let confidence = hypothesis[0].metadata["confidence"].as_f64().unwrap();
        assert!((confidence - DATABASE_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pod_restarts_add_describe_step() {
        let store = Arc::new(MemoryTimeline::default());
        let ara = orchestrator(
            0.0,
            "nothing of note",
            ClusterAccess::Enabled(Arc::new(RestartingCluster)),
            store.clone(),
        );

        ara.run_workflow(Uuid::new_v4(), "payment-service").await;

        let events = store.events.lock().unwrap().clone();
        assert!(events.iter().any(|e| e.title.contains("Infrastructure issue found")));

        let steps = metadata_entries(&events, "step");
        assert_eq!(steps.len(), 1);
        assert!(steps[0].title.contains("Inspect pod describe"));
    }
}
