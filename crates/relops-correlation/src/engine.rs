//! Correlation engine
//!
//! `correlate_incident` runs under a counted semaphore so at most
//! [`WORKER_POOL_SIZE`] correlations execute at once; callers block until
//! a slot frees. Evidence gathering is best-effort per source: a failing
//! sub-step is logged and skipped so a partial correlation set is always
//! persisted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relops_adapters::{ClusterAccess, LogAdapter, LogEntry, MetricsAdapter, PodState};
use relops_common::{
    Correlation, CorrelationKind, Error, NewCorrelation, Result, RootCauseCandidate, Severity,
    SignalSource,
};
use relops_store::AnalysisStore;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scoring::{
    self, ERROR_RATE_THRESHOLD_PCT, LATENCY_THRESHOLD_MS,
};

/// Maximum number of concurrent correlation tasks
pub const WORKER_POOL_SIZE: usize = 10;

/// How far back pattern detection looks from the incident start
const PATTERN_LOOKBACK: i64 = 10;

/// How far back the error-log fetch looks, and its row cap
const ERROR_LOG_LOOKBACK: i64 = 5;
const ERROR_LOG_LIMIT: usize = 100;

/// Correlation confidences per evidence kind
const POD_CONFIDENCE: f64 = 0.95;
const ERROR_RATE_CONFIDENCE: f64 = 0.8;
const LATENCY_CONFIDENCE: f64 = 0.7;
const PATTERN_CONFIDENCE: f64 = 0.6;
const ERROR_LOGS_CONFIDENCE: f64 = 0.8;

/// A pattern must recur this often to become evidence
const PATTERN_MIN_COUNT: u64 = 5;

/// In-memory working state for one correlation pass
#[derive(Debug, Clone)]
pub struct IncidentContext {
    pub service: String,
    pub namespace: String,
    pub start_time: DateTime<Utc>,
    pub severity: Severity,
    pub affected_pods: Vec<PodState>,
    pub log_errors: Vec<LogEntry>,
    /// Ordered so ranking ties break deterministically
    pub log_patterns: BTreeMap<String, u64>,
    pub metrics: HashMap<String, f64>,
    pub correlations: Vec<NewCorrelation>,
    pub incident_confidence: f64,
    pub root_cause_summary: Vec<RootCauseCandidate>,
}

impl IncidentContext {
    pub fn new(service: &str, namespace: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            service: service.to_string(),
            namespace: namespace.to_string(),
            start_time,
            severity: Severity::Medium,
            affected_pods: Vec::new(),
            log_errors: Vec::new(),
            log_patterns: BTreeMap::new(),
            metrics: HashMap::new(),
            correlations: Vec::new(),
            incident_confidence: 0.0,
            root_cause_summary: Vec::new(),
        }
    }
}

/// High-level analysis contract for an incident
#[derive(Debug, Clone, Serialize)]
pub struct IncidentAnalysis {
    pub incident_id: Uuid,
    pub service: String,
    pub namespace: String,
    pub incident_confidence: f64,
    pub root_cause_summary: Vec<RootCauseCandidate>,
    pub root_cause_summary_text: String,
    pub correlations: Vec<Correlation>,
}

/// Root cause analysis with bounded concurrency
pub struct CorrelationEngine {
    store: Arc<dyn AnalysisStore>,
    metrics: Arc<dyn MetricsAdapter>,
    logs: Arc<dyn LogAdapter>,
    cluster: ClusterAccess,
    slots: Semaphore,
}

impl CorrelationEngine {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        metrics: Arc<dyn MetricsAdapter>,
        logs: Arc<dyn LogAdapter>,
        cluster: ClusterAccess,
    ) -> Self {
        Self {
            store,
            metrics,
            logs,
            cluster,
            slots: Semaphore::new(WORKER_POOL_SIZE),
        }
    }

    /// Perform comprehensive correlation for an incident. Blocks until a
    /// worker slot frees, gathers evidence from all sources, ranks root
    /// causes and atomically replaces the incident's correlation rows.
    pub async fn correlate_incident(
        &self,
        incident_id: Uuid,
        service: &str,
        namespace: &str,
        start_time: DateTime<Utc>,
    ) -> Result<IncidentContext> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| Error::Internal("correlation worker pool closed".to_string()))?;

        let mut ctx = IncidentContext::new(service, namespace, start_time);

        if let Err(e) = self.gather_infrastructure(&mut ctx).await {
            warn!("Failed to correlate cluster state: {e}");
        }
        if let Err(e) = self.gather_metrics(&mut ctx).await {
            warn!("Failed to correlate metrics: {e}");
        }
        if let Err(e) = self.gather_logs(&mut ctx).await {
            warn!("Failed to correlate logs: {e}");
        }

        let ranking = scoring::rank(&ctx);
        ctx.incident_confidence = ranking.incident_confidence;
        ctx.severity = ranking.severity;
        ctx.root_cause_summary = ranking.candidates;

        self.store
            .replace_correlations(incident_id, &ctx.correlations)
            .await?;

        info!(
            "Correlation completed for incident {}: {} correlations, confidence {:.2}",
            incident_id,
            ctx.correlations.len(),
            ctx.incident_confidence
        );
        Ok(ctx)
    }

    async fn gather_infrastructure(&self, ctx: &mut IncidentContext) -> Result<()> {
        let Some(adapter) = self.cluster.adapter() else {
            debug!("Cluster adapter absent, recording availability marker");
            ctx.correlations.push(NewCorrelation {
                kind: CorrelationKind::Status,
                source_type: SignalSource::Kubernetes,
                source_id: "client".to_string(),
                confidence_score: 1.0,
                details: json!({
                    "status": "not available",
                    "message": "Kubernetes integration not configured",
                }),
            });
            return Ok(());
        };

        let pods = adapter.pods(&ctx.namespace, &ctx.service).await?;
        for pod in &pods {
            if pod.status != "Running" {
                ctx.correlations.push(NewCorrelation {
                    kind: CorrelationKind::Infrastructure,
                    source_type: SignalSource::Kubernetes,
                    source_id: pod.name.clone(),
                    confidence_score: POD_CONFIDENCE,
                    details: json!({
                        "status": pod.status,
                        "reason": "Pod unhealthy",
                    }),
                });
            }
        }
        ctx.affected_pods = pods;
        Ok(())
    }

    async fn gather_metrics(&self, ctx: &mut IncidentContext) -> Result<()> {
        match self.metrics.error_rate(&ctx.service).await {
            Ok(error_rate) => {
                ctx.metrics.insert("error_rate".to_string(), error_rate);
                if error_rate > ERROR_RATE_THRESHOLD_PCT {
                    ctx.correlations.push(NewCorrelation {
                        kind: CorrelationKind::Metric,
                        source_type: SignalSource::Prometheus,
                        source_id: "error_rate".to_string(),
                        confidence_score: ERROR_RATE_CONFIDENCE,
                        details: json!({ "value": error_rate, "unit": "percent" }),
                    });
                }
            }
            Err(e) => warn!("error-rate lookup failed for {}: {e}", ctx.service),
        }

        match self.metrics.latency_p95(&ctx.service).await {
            Ok(latency) => {
                ctx.metrics.insert("latency_p95".to_string(), latency);
                if latency > LATENCY_THRESHOLD_MS {
                    ctx.correlations.push(NewCorrelation {
                        kind: CorrelationKind::Metric,
                        source_type: SignalSource::Prometheus,
                        source_id: "latency_p95".to_string(),
                        confidence_score: LATENCY_CONFIDENCE,
                        details: json!({ "value": latency, "unit": "ms" }),
                    });
                }
            }
            Err(e) => warn!("latency lookup failed for {}: {e}", ctx.service),
        }

        match self.metrics.request_rate(&ctx.service).await {
            Ok(rate) => {
                ctx.metrics.insert("request_rate".to_string(), rate);
            }
            Err(e) => warn!("request-rate lookup failed for {}: {e}", ctx.service),
        }

        Ok(())
    }

    async fn gather_logs(&self, ctx: &mut IncidentContext) -> Result<()> {
        let pattern_since = ctx.start_time - ChronoDuration::minutes(PATTERN_LOOKBACK);
        match self.logs.detect_patterns(&ctx.service, pattern_since).await {
            Ok(patterns) => {
                ctx.log_patterns = patterns.into_iter().collect();
                for (pattern, count) in &ctx.log_patterns {
                    if *count > PATTERN_MIN_COUNT {
                        ctx.correlations.push(NewCorrelation {
                            kind: CorrelationKind::LogPattern,
                            source_type: SignalSource::Loki,
                            source_id: "pattern_detected".to_string(),
                            confidence_score: PATTERN_CONFIDENCE,
                            details: json!({ "pattern": pattern, "count": count }),
                        });
                    }
                }
            }
            Err(e) => warn!("pattern detection failed for {}: {e}", ctx.service),
        }

        let errors_since = ctx.start_time - ChronoDuration::minutes(ERROR_LOG_LOOKBACK);
        match self
            .logs
            .error_logs(&ctx.service, errors_since, ERROR_LOG_LIMIT)
            .await
        {
            Ok(error_logs) => {
                if !error_logs.is_empty() {
                    ctx.correlations.push(NewCorrelation {
                        kind: CorrelationKind::Logs,
                        source_type: SignalSource::Loki,
                        source_id: "error_logs".to_string(),
                        confidence_score: ERROR_LOGS_CONFIDENCE,
                        details: json!({ "error_count": error_logs.len() }),
                    });
                }
                ctx.log_errors = error_logs;
            }
            Err(e) => warn!("error-log fetch failed for {}: {e}", ctx.service),
        }

        Ok(())
    }

    /// Rebuild a lightweight context from the persisted correlations and
    /// re-run only the ranking step. Used by the read path; no fresh
    /// evidence is gathered, so given unchanged correlations the primary
    /// and confidence match the original correlation pass.
    pub async fn incident_analysis(&self, incident_id: Uuid) -> Result<IncidentAnalysis> {
        let incident = self
            .store
            .incident(incident_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("incident {incident_id}")))?;
        let service = incident.service.clone().unwrap_or_default();

        let correlations = self.store.correlations(incident_id).await?;

        let mut ctx = IncidentContext::new(&service, "", incident.started_at);
        for correlation in &correlations {
            match correlation.kind {
                CorrelationKind::Metric => {
                    if let Some(value) = correlation.details.get("value").and_then(|v| v.as_f64()) {
                        match correlation.source_id.as_str() {
                            "error_rate" => {
                                ctx.metrics.insert("error_rate".to_string(), value);
                            }
                            "latency_p95" => {
                                ctx.metrics.insert("latency_p95".to_string(), value);
                            }
                            _ => {}
                        }
                    }
                }
                CorrelationKind::LogPattern => {
                    let pattern = correlation
                        .details
                        .get("pattern")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let count = correlation
                        .details
                        .get("count")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    if !pattern.is_empty() {
                        ctx.log_patterns.insert(pattern.to_string(), count);
                    }
                }
                CorrelationKind::Infrastructure => {
                    let status = correlation
                        .details
                        .get("status")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown");
                    ctx.affected_pods.push(PodState {
                        name: correlation.source_id.clone(),
                        namespace: String::new(),
                        status: status.to_string(),
                        restarts: 0,
                        last_restart: None,
                    });
                }
                _ => {}
            }
        }

        let ranking = scoring::rank(&ctx);
        let root_cause_summary_text = ranking
            .candidates
            .iter()
            .find(|c| c.primary)
            .map(|c| c.reason.clone())
            .unwrap_or_default();

        Ok(IncidentAnalysis {
            incident_id,
            service,
            namespace: String::new(),
            incident_confidence: ranking.incident_confidence.clamp(0.0, 1.0),
            root_cause_summary: ranking.candidates,
            root_cause_summary_text,
            correlations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relops_adapters::{ClusterAdapter, ClusterEvent, ClusterSummary, DeploymentState, MetricSample, RangeSeries};
    use relops_common::{
        Incident, IncidentPatch, IncidentStatus, NewIncident, Service, ServiceId,
    };
    use relops_stability::HealthState;
    use relops_store::{CorrelationStore, IncidentStore};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        incidents: StdMutex<Vec<Incident>>,
        correlations: StdMutex<Vec<Correlation>>,
        replace_calls: StdMutex<usize>,
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
            let now = Utc::now();
            let incident = Incident {
                id: Uuid::new_v4(),
                title: new.title,
                description: new.description,
                severity: new.severity,
                status: IncidentStatus::Open,
                service_id: new.service_id,
                service: Some("payment-service".to_string()),
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
            Ok(Vec::new())
        }

        async fn update_incident(
            &self,
            _id: Uuid,
            _patch: IncidentPatch,
        ) -> Result<Option<Incident>> {
            unimplemented!("not exercised by engine tests")
        }
    }

    #[async_trait]
    impl CorrelationStore for MemoryStore {
        async fn replace_correlations(
            &self,
            incident_id: Uuid,
            rows: &[NewCorrelation],
        ) -> Result<Vec<Correlation>> {
            *self.replace_calls.lock().unwrap() += 1;
            let mut stored = self.correlations.lock().unwrap();
            stored.retain(|c| c.incident_id != incident_id);
            let inserted: Vec<Correlation> = rows
                .iter()
                .map(|row| Correlation {
                    id: Uuid::new_v4(),
                    incident_id,
                    kind: row.kind,
                    source_type: row.source_type,
                    source_id: row.source_id.clone(),
                    confidence_score: row.confidence_score,
                    details: row.details.clone(),
                    created_at: Utc::now(),
                })
                .collect();
            stored.extend(inserted.clone());
            Ok(inserted)
        }

        async fn correlations(&self, incident_id: Uuid) -> Result<Vec<Correlation>> {
            Ok(self
                .correlations
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.incident_id == incident_id)
                .cloned()
                .collect())
        }
    }

    struct FixedMetrics {
        error_rate: f64,
        latency_p95: f64,
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
            Ok(self.error_rate)
        }

        async fn latency_p95(&self, _service: &str) -> Result<f64> {
            Ok(self.latency_p95)
        }

        async fn request_rate(&self, _service: &str) -> Result<f64> {
            Ok(42.0)
        }

        async fn error_ratio(&self, _service: &str) -> Result<f64> {
            Ok(self.error_rate / 100.0)
        }

        async fn availability(&self, _service: &str, _window: u32) -> Result<f64> {
            Ok(100.0 - self.error_rate)
        }

        async fn push_counter(
            &self,
            _n: &str,
            _v: f64,
            _l: &HashMap<String, String>,
        ) -> Result<()> {
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
        patterns: HashMap<String, u64>,
        errors: usize,
    }

    #[async_trait]
    impl LogAdapter for FixedLogs {
        async fn error_logs(
            &self,
            _service: &str,
            since: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<LogEntry>> {
            Ok((0..self.errors.min(limit))
                .map(|i| LogEntry {
                    timestamp: since + ChronoDuration::seconds(i as i64),
                    level: "error".to_string(),
                    message: format!("error {i}"),
                    labels: HashMap::new(),
                })
                .collect())
        }

        async fn detect_patterns(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> Result<HashMap<String, u64>> {
            Ok(self.patterns.clone())
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
            Ok("No dominant error pattern found in recent logs".to_string())
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    struct FixedCluster {
        pods: Vec<PodState>,
    }

    #[async_trait]
    impl ClusterAdapter for FixedCluster {
        async fn pods(&self, _namespace: &str, _service: &str) -> Result<Vec<PodState>> {
            Ok(self.pods.clone())
        }

        async fn deployments(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> Result<Vec<DeploymentState>> {
            Ok(Vec::new())
        }

        async fn events(
            &self,
            _namespace: &str,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<ClusterEvent>> {
            Ok(Vec::new())
        }

        async fn restart_deployment(&self, _namespace: &str, _name: &str) -> Result<()> {
            Ok(())
        }

        async fn scale_deployment(&self, _ns: &str, _name: &str, _replicas: i32) -> Result<()> {
            Ok(())
        }

        async fn cluster_status(&self) -> Result<ClusterSummary> {
            Ok(ClusterSummary {
                total_pods: self.pods.len(),
                running_pods: 0,
                failed_pods: 0,
                pending_pods: 0,
                pods: self.pods.clone(),
                last_check: Utc::now(),
            })
        }

        async fn health(&self) -> Result<HealthState> {
            Ok(HealthState::Healthy)
        }
    }

    fn crash_pod(name: &str) -> PodState {
        PodState {
            name: name.to_string(),
            namespace: "default".to_string(),
            status: "CrashLoopBackOff".to_string(),
            restarts: 5,
            last_restart: None,
        }
    }

    async fn seeded_incident(store: &MemoryStore) -> Incident {
        store
            .create_incident(NewIncident {
                title: "[critical] High Error Rate detected in payment-service".to_string(),
                description: String::new(),
                severity: Severity::Critical,
                service_id: None,
                started_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_signal_correlation_persists_everything() {
        let store = Arc::new(MemoryStore::default());
        let incident = seeded_incident(&store).await;

        let mut patterns = HashMap::new();
        patterns.insert("DB timeout".to_string(), 12);

        let engine = CorrelationEngine::new(
            store.clone(),
            Arc::new(FixedMetrics { error_rate: 30.0, latency_p95: 1500.0 }),
            Arc::new(FixedLogs { patterns, errors: 7 }),
            ClusterAccess::Enabled(Arc::new(FixedCluster { pods: vec![crash_pod("p1")] })),
        );

        let ctx = engine
            .correlate_incident(incident.id, "payment-service", "default", incident.started_at)
            .await
            .unwrap();

        // infra pod + error rate + latency + pattern + error logs
        assert_eq!(ctx.correlations.len(), 5);
        assert_eq!(ctx.root_cause_summary.len(), 4);
        assert_eq!(ctx.severity, Severity::High);

        let primary: Vec<_> = ctx.root_cause_summary.iter().filter(|c| c.primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].signal_ids, vec!["error_rate".to_string()]);

        let persisted = store.correlations(incident.id).await.unwrap();
        assert_eq!(persisted.len(), 5);
    }

    #[tokio::test]
    async fn disabled_cluster_yields_status_marker() {
        let store = Arc::new(MemoryStore::default());
        let incident = seeded_incident(&store).await;

        let engine = CorrelationEngine::new(
            store.clone(),
            Arc::new(FixedMetrics { error_rate: 0.0, latency_p95: 0.0 }),
            Arc::new(FixedLogs { patterns: HashMap::new(), errors: 0 }),
            ClusterAccess::Disabled,
        );

        let ctx = engine
            .correlate_incident(incident.id, "payment-service", "default", incident.started_at)
            .await
            .unwrap();

        assert!(ctx.root_cause_summary.is_empty());
        assert!((ctx.incident_confidence - 0.3).abs() < 1e-9);
        assert_eq!(ctx.severity, Severity::Medium);

        assert_eq!(ctx.correlations.len(), 1);
        assert_eq!(ctx.correlations[0].kind, CorrelationKind::Status);
        assert_eq!(
            ctx.correlations[0].details["status"],
            serde_json::Value::String("not available".to_string())
        );
    }

    #[tokio::test]
    async fn recorrelation_replaces_rather_than_accumulates() {
        let store = Arc::new(MemoryStore::default());
        let incident = seeded_incident(&store).await;

        let engine = CorrelationEngine::new(
            store.clone(),
            Arc::new(FixedMetrics { error_rate: 30.0, latency_p95: 0.0 }),
            Arc::new(FixedLogs { patterns: HashMap::new(), errors: 0 }),
            ClusterAccess::Disabled,
        );

        engine
            .correlate_incident(incident.id, "payment-service", "default", incident.started_at)
            .await
            .unwrap();
        engine
            .correlate_incident(incident.id, "payment-service", "default", incident.started_at)
            .await
            .unwrap();

        // status marker + error-rate correlation, once
        assert_eq!(store.correlations(incident.id).await.unwrap().len(), 2);
        assert_eq!(*store.replace_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn analysis_round_trips_the_correlation_verdict() {
        let store = Arc::new(MemoryStore::default());
        let incident = seeded_incident(&store).await;

        let mut patterns = HashMap::new();
        patterns.insert("DB timeout".to_string(), 12);

        let engine = CorrelationEngine::new(
            store.clone(),
            Arc::new(FixedMetrics { error_rate: 30.0, latency_p95: 1500.0 }),
            Arc::new(FixedLogs { patterns, errors: 3 }),
            ClusterAccess::Enabled(Arc::new(FixedCluster { pods: vec![crash_pod("p1")] })),
        );

        let ctx = engine
            .correlate_incident(incident.id, "payment-service", "default", incident.started_at)
            .await
            .unwrap();

        let analysis = engine.incident_analysis(incident.id).await.unwrap();

        let ctx_primary = ctx.root_cause_summary.iter().find(|c| c.primary).unwrap();
        let analysis_primary = analysis
            .root_cause_summary
            .iter()
            .find(|c| c.primary)
            .unwrap();
        assert_eq!(ctx_primary.signal_type, analysis_primary.signal_type);
        assert_eq!(ctx_primary.signal_ids, analysis_primary.signal_ids);
        assert!((ctx.incident_confidence - analysis.incident_confidence).abs() < 1e-9);
        assert_eq!(analysis.root_cause_summary_text, ctx_primary.reason);
    }

    #[tokio::test]
    async fn analysis_of_unknown_incident_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let engine = CorrelationEngine::new(
            store,
            Arc::new(FixedMetrics { error_rate: 0.0, latency_p95: 0.0 }),
            Arc::new(FixedLogs { patterns: HashMap::new(), errors: 0 }),
            ClusterAccess::Disabled,
        );

        let err = engine.incident_analysis(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.category(), "not_found");
    }
}
