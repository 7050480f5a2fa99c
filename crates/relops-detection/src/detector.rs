//! Incident detector
//!
//! Each cycle loads the enabled rules, evaluates them by kind and turns
//! threshold breaches into incidents. An in-memory active-alert set keyed
//! by `rule_name|service` prevents duplicate incidents while a condition
//! keeps firing; resolution only removes the key, incident status stays
//! operator-driven.

use chrono::{DateTime, Utc};
use relops_adapters::{ClusterAccess, MetricsAdapter};
use relops_common::{
    NewIncident, NewTimelineEvent, Result, RuleKind, Severity, TimelineEventKind, DetectionRule,
};
use relops_store::DetectionStore;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use async_trait::async_trait;

/// Default cycle interval
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline handed to the correlation kickoff for each new incident
pub const CORRELATION_DEADLINE: Duration = Duration::from_secs(30);

/// Service attributed to pattern-rule events
const CLUSTER_SERVICE: &str = "kubernetes";

/// A detected anomaly, prior to incident materialization
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub rule_kind: RuleKind,
    pub service: String,
    pub severity: Severity,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub evidence: Vec<String>,
}

/// Capability invoked when a new incident is created. The callback runs
/// off the detector's mutex, under a fresh deadline.
#[async_trait]
pub trait CorrelationTrigger: Send + Sync {
    async fn incident_detected(
        &self,
        incident_id: Uuid,
        service: String,
        timestamp: DateTime<Utc>,
    );
}

/// Detects incidents from telemetry data
pub struct IncidentDetector {
    store: Arc<dyn DetectionStore>,
    metrics: Arc<dyn MetricsAdapter>,
    cluster: ClusterAccess,
    trigger: Arc<dyn CorrelationTrigger>,
    active_alerts: Mutex<HashMap<String, DetectionEvent>>,
}

impl IncidentDetector {
    pub fn new(
        store: Arc<dyn DetectionStore>,
        metrics: Arc<dyn MetricsAdapter>,
        cluster: ClusterAccess,
        trigger: Arc<dyn CorrelationTrigger>,
    ) -> Self {
        Self {
            store,
            metrics,
            cluster,
            trigger,
            active_alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Run detection cycles until the shutdown signal flips. A cycle that
    /// overruns the interval causes the next tick to be skipped rather
    /// than queued.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Starting incident detection with interval {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Stopping incident detection");
                        return;
                    }
                }
            }
        }
    }

    /// Execute one detection cycle: load rules, evaluate, process events
    pub async fn run_cycle(&self) {
        debug!("Running incident detection cycle");

        let rules = match self.store.enabled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!("Failed to load detection rules: {e}");
                return;
            }
        };

        let mut detected = Vec::new();
        for rule in &rules {
            match self.evaluate_rule(rule).await {
                Ok(events) => detected.extend(events),
                Err(e) => {
                    // The rule stays enabled; the failure repeats in the
                    // log each cycle until the rule or the source is fixed
                    warn!("Failed to evaluate rule '{}' ({}): {e}", rule.name, e.category());
                }
            }
        }

        let count = detected.len();
        for event in detected {
            if let Err(e) = self.process_event(event).await {
                error!("Failed to process detection event: {e}");
            }
        }

        debug!("Detection cycle complete, {count} events detected");
    }

    async fn evaluate_rule(&self, rule: &DetectionRule) -> Result<Vec<DetectionEvent>> {
        match rule.kind {
            RuleKind::Threshold => self.evaluate_threshold(rule).await,
            RuleKind::Pattern => self.evaluate_pattern(rule).await,
            // Reserved; no emissions in this version
            RuleKind::Anomaly => Ok(Vec::new()),
        }
    }

    /// Execute the rule's query and emit one event per label vector whose
    /// value exceeds the threshold
    async fn evaluate_threshold(&self, rule: &DetectionRule) -> Result<Vec<DetectionEvent>> {
        let samples = self.metrics.query(&rule.query, None).await?;

        let mut events = Vec::new();
        for sample in samples {
            if sample.value <= rule.threshold_value {
                continue;
            }

            let service = sample
                .labels
                .get("service")
                .cloned()
                .unwrap_or_else(|| "unknown-service".to_string());

            info!(
                "Detection triggered: rule={}, service={}, value={:.4}, threshold={:.4}",
                rule.name, service, sample.value, rule.threshold_value
            );

            let evidence = vec![
                format!(
                    "Rule '{}' triggered: {:.4} exceeded threshold {:.4}",
                    rule.name, sample.value, rule.threshold_value
                ),
                format!("Service: {service}"),
                format!("Query: {}", rule.query),
            ];

            events.push(DetectionEvent {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                rule_kind: rule.kind,
                service,
                severity: rule.severity,
                value: sample.value,
                timestamp: Utc::now(),
                metadata: json!({
                    "threshold": rule.threshold_value,
                    "actual": sample.value,
                    "exceeded_by": sample.value - rule.threshold_value,
                    "labels": sample.labels,
                }),
                evidence,
            });
        }
        Ok(events)
    }

    /// Pattern rules inspect cluster state; currently only pod crash
    /// loops in the default namespace
    async fn evaluate_pattern(&self, rule: &DetectionRule) -> Result<Vec<DetectionEvent>> {
        if rule.name != "Pod Crash Loop" {
            return Ok(Vec::new());
        }
        let Some(adapter) = self.cluster.adapter() else {
            return Ok(Vec::new());
        };

        let pods = adapter.pods("default", "all").await?;
        let crashing = pods
            .iter()
            .filter(|pod| pod.status == "CrashLoopBackOff")
            .count();
        if crashing == 0 {
            return Ok(Vec::new());
        }

        info!("Detection triggered: rule={}, {crashing} pods in CrashLoopBackOff", rule.name);

        Ok(vec![DetectionEvent {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_kind: rule.kind,
            service: CLUSTER_SERVICE.to_string(),
            severity: rule.severity,
            value: crashing as f64,
            timestamp: Utc::now(),
            metadata: json!({ "pod_count": crashing }),
            evidence: vec![format!("Detected {crashing} pods in CrashLoopBackOff")],
        }])
    }

    /// Convert a detection event into an incident unless the alert is
    /// already active. Returns whether a new incident was created.
    pub async fn process_event(&self, event: DetectionEvent) -> Result<bool> {
        let key = alert_key(&event.rule_name, &event.service);
        let mut active = self.active_alerts.lock().await;

        if let Some(existing) = active.get_mut(&key) {
            // Still firing; refresh and move on
            existing.timestamp = event.timestamp;
            debug!("Alert {key} still active, not creating a duplicate incident");
            return Ok(false);
        }

        let service_name = normalize_service(&event.service);
        let service_id = match self.store.upsert_service_degraded(&service_name).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to upsert service '{service_name}': {e}");
                None
            }
        };

        let title = format!(
            "[{}] {} detected in {}",
            event.severity, event.rule_name, service_name
        );
        let description = format!(
            "Automated incident creation\n\n\
             Detection rule: {}\n\
             Service: {}\n\
             Triggered value: {:.4}\n\
             Severity: {}\n\
             Timestamp: {}\n\n\
             Evidence:\n{}",
            event.rule_name,
            service_name,
            event.value,
            event.severity,
            event.timestamp.to_rfc3339(),
            event.evidence.join("\n"),
        );

        let incident = self
            .store
            .create_incident(NewIncident {
                title,
                description,
                severity: event.severity,
                service_id,
                started_at: event.timestamp,
            })
            .await?;

        let (event_type, source) = match event.rule_kind {
            RuleKind::Pattern => (TimelineEventKind::K8sEvent, "kubernetes"),
            _ => (TimelineEventKind::MetricAnomaly, "prometheus"),
        };
        if let Err(e) = self
            .store
            .append_timeline_event(NewTimelineEvent {
                incident_id: incident.id,
                event_type,
                timestamp: event.timestamp,
                source: source.to_string(),
                title: format!("Detected: {}", event.rule_name),
                description: format!(
                    "Automated detection triggered: {} (value: {:.2})",
                    event.rule_name, event.value
                ),
                metadata: event.metadata.clone(),
            })
            .await
        {
            warn!("Failed to add timeline event for incident {}: {e}", incident.id);
        }

        let timestamp = event.timestamp;
        active.insert(key, event);
        drop(active);

        info!(
            "Incident created: id={}, service={}, severity={}",
            incident.id, service_name, incident.severity
        );

        // Kick off correlation off the detector mutex, with its own deadline
        let trigger = self.trigger.clone();
        let incident_id = incident.id;
        tokio::spawn(async move {
            if tokio::time::timeout(
                CORRELATION_DEADLINE,
                trigger.incident_detected(incident_id, service_name, timestamp),
            )
            .await
            .is_err()
            {
                warn!("Correlation kickoff for incident {incident_id} hit its deadline");
            }
        });

        Ok(true)
    }

    /// Drop the active-alert key for a no-longer-firing condition. The
    /// incident itself stays as-is.
    pub async fn resolve_alert(&self, rule_name: &str, service: &str) {
        let key = alert_key(rule_name, service);
        if self.active_alerts.lock().await.remove(&key).is_some() {
            info!("Alert resolved: {key}");
        }
    }

    /// Snapshot of the currently active alerts
    pub async fn active_alerts(&self) -> HashMap<String, DetectionEvent> {
        self.active_alerts.lock().await.clone()
    }
}

fn alert_key(rule_name: &str, service: &str) -> String {
    format!("{rule_name}|{service}")
}

fn normalize_service(service: &str) -> String {
    if service.is_empty() || service == "all" {
        "unknown-service".to_string()
    } else {
        service.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relops_adapters::{MetricSample, RangeSeries};
    use relops_common::{Error, Incident, IncidentPatch, IncidentStatus, Service, ServiceId};
    use relops_stability::HealthState;
    use relops_store::{IncidentStore, RuleStore, TimelineStore};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    /// In-memory stand-in for the persistence gateway
    #[derive(Default)]
    struct MemoryStore {
        rules: StdMutex<Vec<DetectionRule>>,
        incidents: StdMutex<Vec<Incident>>,
        timeline: StdMutex<Vec<relops_common::TimelineEvent>>,
        fail_inserts: bool,
    }

    #[async_trait]
    impl RuleStore for MemoryStore {
        async fn enabled_rules(&self) -> Result<Vec<DetectionRule>> {
            Ok(self.rules.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl IncidentStore for MemoryStore {
        async fn upsert_service_degraded(&self, _name: &str) -> Result<ServiceId> {
            Ok(Uuid::new_v4())
        }

        async fn services(&self) -> Result<Vec<Service>> {
            Ok(Vec::new())
        }

        async fn create_incident(&self, new: NewIncident) -> Result<Incident> {
            if self.fail_inserts {
                return Err(Error::Internal("insert failed: pool closed".to_string()));
            }
            let now = Utc::now();
            let incident = Incident {
                id: Uuid::new_v4(),
                title: new.title,
                description: new.description,
                severity: new.severity,
                status: IncidentStatus::Open,
                service_id: new.service_id,
                service: None,
                started_at: new.started_at,
                resolved_at: None,
                created_at: now,
                updated_at: now,
            };
            self.incidents.lock().unwrap().push(incident.clone());
            Ok(incident)
        }

        async fn incident(&self, id: Uuid) -> Result<Option<Incident>> {
            Ok(self.incidents.lock().unwrap().iter().find(|i| i.id == id).cloned())
        }

        async fn incidents(&self, _limit: i64, _offset: i64) -> Result<Vec<Incident>> {
            Ok(self.incidents.lock().unwrap().clone())
        }

        async fn active_incidents(&self) -> Result<Vec<Incident>> {
            Ok(self.incidents.lock().unwrap().clone())
        }

        async fn update_incident(
            &self,
            _id: Uuid,
            _patch: IncidentPatch,
        ) -> Result<Option<Incident>> {
            unimplemented!("not exercised by detector tests")
        }
    }

    #[async_trait]
    impl TimelineStore for MemoryStore {
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
            self.timeline.lock().unwrap().push(stored.clone());
            Ok(stored)
        }

        async fn timeline(&self, _incident_id: Uuid) -> Result<Vec<relops_common::TimelineEvent>> {
            Ok(self.timeline.lock().unwrap().clone())
        }
    }

    /// Metrics adapter returning canned instant-query samples
    struct FixedMetrics {
        samples: Vec<MetricSample>,
    }

    #[async_trait]
    impl MetricsAdapter for FixedMetrics {
        async fn query(
            &self,
            _query: &str,
            _at: Option<DateTime<Utc>>,
        ) -> Result<Vec<MetricSample>> {
            Ok(self.samples.clone())
        }

        async fn query_range(
            &self,
            _query: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _step: Duration,
        ) -> Result<Vec<RangeSeries>> {
            Ok(Vec::new())
        }

        async fn error_rate(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn latency_p95(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn request_rate(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn error_ratio(&self, _service: &str) -> Result<f64> {
            Ok(0.0)
        }

        async fn availability(&self, _service: &str, _window_days: u32) -> Result<f64> {
            Ok(100.0)
        }

        async fn push_counter(
            &self,
            _name: &str,
            _value: f64,
            _labels: &StdHashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn push_histogram(
            &self,
            _name: &str,
            _value: f64,
            _labels: &StdHashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    #[derive(Default)]
    struct RecordingTrigger {
        calls: StdMutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl CorrelationTrigger for RecordingTrigger {
        async fn incident_detected(
            &self,
            incident_id: Uuid,
            service: String,
            _timestamp: DateTime<Utc>,
        ) {
            self.calls.lock().unwrap().push((incident_id, service));
        }
    }

    fn threshold_rule(name: &str, threshold: f64, severity: Severity) -> DetectionRule {
        let now = Utc::now();
        DetectionRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            enabled: true,
            kind: RuleKind::Threshold,
            query: "rate(http_requests_total{status=~\"5..\"}[5m])".to_string(),
            threshold_value: threshold,
            severity,
            service_id: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_for(service: &str, value: f64) -> MetricSample {
        let mut labels = StdHashMap::new();
        labels.insert("service".to_string(), service.to_string());
        MetricSample {
            labels,
            value,
            timestamp: 1_700_000_000.0,
        }
    }

    fn detector_with(
        store: Arc<MemoryStore>,
        samples: Vec<MetricSample>,
        trigger: Arc<RecordingTrigger>,
    ) -> IncidentDetector {
        IncidentDetector::new(
            store,
            Arc::new(FixedMetrics { samples }),
            ClusterAccess::Disabled,
            trigger,
        )
    }

    #[tokio::test]
    async fn first_fire_creates_incident_timeline_and_alert() {
        let store = Arc::new(MemoryStore::default());
        store.rules.lock().unwrap().push(threshold_rule(
            "High Error Rate",
            0.20,
            Severity::Critical,
        ));
        let trigger = Arc::new(RecordingTrigger::default());
        let detector = detector_with(store.clone(), vec![sample_for("payment-service", 0.30)], trigger.clone());

        detector.run_cycle().await;

        let incidents = store.incidents.lock().unwrap().clone();
        assert_eq!(incidents.len(), 1);
        assert!(incidents[0].title.contains("High Error Rate"));
        assert!(incidents[0].title.contains("payment-service"));
        assert_eq!(incidents[0].severity, Severity::Critical);
        assert_eq!(incidents[0].status, IncidentStatus::Open);

        let timeline = store.timeline.lock().unwrap().clone();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].event_type, TimelineEventKind::MetricAnomaly);
        assert_eq!(timeline[0].source, "prometheus");

        let alerts = detector.active_alerts().await;
        assert!(alerts.contains_key("High Error Rate|payment-service"));

        // The kickoff runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = trigger.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "payment-service");
    }

    #[tokio::test]
    async fn duplicate_fire_refreshes_without_new_incident() {
        let store = Arc::new(MemoryStore::default());
        store.rules.lock().unwrap().push(threshold_rule(
            "High Error Rate",
            0.20,
            Severity::Critical,
        ));
        let trigger = Arc::new(RecordingTrigger::default());
        let detector = detector_with(store.clone(), vec![sample_for("payment-service", 0.30)], trigger);

        detector.run_cycle().await;
        let first_seen = detector.active_alerts().await["High Error Rate|payment-service"].timestamp;

        detector.run_cycle().await;

        assert_eq!(store.incidents.lock().unwrap().len(), 1);
        let alerts = detector.active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts["High Error Rate|payment-service"].timestamp >= first_seen);
    }

    #[tokio::test]
    async fn resolve_alert_allows_refire() {
        let store = Arc::new(MemoryStore::default());
        store.rules.lock().unwrap().push(threshold_rule("High Error Rate", 0.20, Severity::High));
        let trigger = Arc::new(RecordingTrigger::default());
        let detector = detector_with(store.clone(), vec![sample_for("payment-service", 0.30)], trigger);

        detector.run_cycle().await;
        detector.resolve_alert("High Error Rate", "payment-service").await;
        assert!(detector.active_alerts().await.is_empty());

        detector.run_cycle().await;
        assert_eq!(store.incidents.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn values_at_or_below_threshold_do_not_fire() {
        let store = Arc::new(MemoryStore::default());
        store.rules.lock().unwrap().push(threshold_rule("High Error Rate", 0.20, Severity::High));
        let trigger = Arc::new(RecordingTrigger::default());
        let detector = detector_with(store.clone(), vec![sample_for("payment-service", 0.20)], trigger);

        detector.run_cycle().await;
        assert!(store.incidents.lock().unwrap().is_empty());
        assert!(detector.active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn missing_service_label_attributes_unknown_service() {
        let store = Arc::new(MemoryStore::default());
        store.rules.lock().unwrap().push(threshold_rule("High Error Rate", 0.20, Severity::High));
        let trigger = Arc::new(RecordingTrigger::default());
        let unlabeled = MetricSample {
            labels: StdHashMap::new(),
            value: 0.5,
            timestamp: 1_700_000_000.0,
        };
        let detector = detector_with(store.clone(), vec![unlabeled], trigger);

        detector.run_cycle().await;
        let incidents = store.incidents.lock().unwrap().clone();
        assert_eq!(incidents.len(), 1);
        assert!(incidents[0].title.contains("unknown-service"));
        assert!(detector
            .active_alerts()
            .await
            .contains_key("High Error Rate|unknown-service"));
    }

    #[tokio::test]
    async fn database_failure_fails_the_event_not_the_cycle() {
        let store = Arc::new(MemoryStore {
            fail_inserts: true,
            ..MemoryStore::default()
        });
        store.rules.lock().unwrap().push(threshold_rule("High Error Rate", 0.20, Severity::High));
        let trigger = Arc::new(RecordingTrigger::default());
        let detector = detector_with(store.clone(), vec![sample_for("payment-service", 0.30)], trigger.clone());

        // The cycle itself completes despite the insert failure
        detector.run_cycle().await;
        assert!(store.incidents.lock().unwrap().is_empty());
        // The failed event is not registered as active, so it can retry
        assert!(detector.active_alerts().await.is_empty());
        assert!(trigger.calls.lock().unwrap().is_empty());
    }
}
