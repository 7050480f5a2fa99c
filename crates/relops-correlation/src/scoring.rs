//! Root-cause ranking
//!
//! Pure scoring over a gathered incident context. Candidates come from
//! unhealthy pods, breached metric thresholds and spiking log patterns;
//! the highest-scoring candidate becomes the single primary, with ties
//! broken by first-seen order (pods, then metrics, then patterns).

use relops_common::{CorrelationKind, RootCauseCandidate, Severity, SignalSource};

use crate::engine::IncidentContext;

/// Signal-class weights in the scoring model
pub const METRIC_WEIGHT: f64 = 0.5;
pub const LOG_WEIGHT: f64 = 0.3;
pub const INFRA_WEIGHT: f64 = 0.2;

/// Per-signal confidence multipliers
pub const POD_SIGNAL: f64 = 0.95;
pub const ERROR_RATE_SIGNAL: f64 = 0.9;
pub const LATENCY_SIGNAL: f64 = 0.7;
pub const PATTERN_SIGNAL: f64 = 0.9;

/// Evidence thresholds
pub const ERROR_RATE_THRESHOLD_PCT: f64 = 5.0;
pub const ERROR_RATE_SEVERE_PCT: f64 = 20.0;
pub const LATENCY_THRESHOLD_MS: f64 = 1000.0;
pub const PATTERN_SPIKE_COUNT: u64 = 10;

/// Confidence reported when no candidate exists
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Result of ranking a context's evidence
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Candidates in stable order, exactly one marked primary when non-empty
    pub candidates: Vec<RootCauseCandidate>,
    /// primary score over total score, clamped to [0, 1]
    pub incident_confidence: f64,
    /// Derived from the primary's signal type
    pub severity: Severity,
}

/// Score the gathered evidence and elect a primary
pub fn rank(ctx: &IncidentContext) -> Ranking {
    let mut candidates = Vec::new();

    // 1. Infrastructure: pods not running
    for pod in &ctx.affected_pods {
        if pod.status != "Running" {
            candidates.push(RootCauseCandidate {
                signal_type: CorrelationKind::Infrastructure,
                source: SignalSource::Kubernetes,
                reason: format!("Pod {} is {}", pod.name, pod.status),
                score: INFRA_WEIGHT * POD_SIGNAL,
                primary: false,
                signal_ids: vec![pod.name.clone()],
            });
        }
    }

    // 2. Metrics: high error rate, then high latency
    let error_rate = ctx.metrics.get("error_rate").copied();
    if let Some(rate) = error_rate.filter(|rate| *rate > ERROR_RATE_THRESHOLD_PCT) {
        candidates.push(RootCauseCandidate {
            signal_type: CorrelationKind::Metric,
            source: SignalSource::Prometheus,
            reason: format!("High error rate: {rate:.2}%"),
            score: METRIC_WEIGHT * ERROR_RATE_SIGNAL,
            primary: false,
            signal_ids: vec!["error_rate".to_string()],
        });
    }
    if let Some(latency) = ctx
        .metrics
        .get("latency_p95")
        .copied()
        .filter(|latency| *latency > LATENCY_THRESHOLD_MS)
    {
        candidates.push(RootCauseCandidate {
            signal_type: CorrelationKind::Metric,
            source: SignalSource::Prometheus,
            reason: format!("High latency: {latency:.0}ms"),
            score: METRIC_WEIGHT * LATENCY_SIGNAL,
            primary: false,
            signal_ids: vec!["latency_p95".to_string()],
        });
    }

    // 3. Log patterns, only when correlated with a severe error spike
    if error_rate.unwrap_or(0.0) > ERROR_RATE_SEVERE_PCT {
        for (pattern, count) in &ctx.log_patterns {
            if *count > PATTERN_SPIKE_COUNT {
                candidates.push(RootCauseCandidate {
                    signal_type: CorrelationKind::LogPattern,
                    source: SignalSource::Loki,
                    reason: format!("Log pattern spike: {pattern} ({count} hits)"),
                    score: LOG_WEIGHT * PATTERN_SIGNAL,
                    primary: false,
                    signal_ids: vec![pattern.clone()],
                });
            }
        }
    }

    if candidates.is_empty() {
        return Ranking {
            candidates,
            incident_confidence: FALLBACK_CONFIDENCE,
            severity: Severity::Medium,
        };
    }

    // Elect the primary: strict arg-max keeps the first seen on ties
    let mut primary_idx = 0;
    let mut max_score = 0.0;
    let mut total_score = 0.0;
    for (idx, candidate) in candidates.iter().enumerate() {
        total_score += candidate.score;
        if candidate.score > max_score {
            max_score = candidate.score;
            primary_idx = idx;
        }
    }
    candidates[primary_idx].primary = true;

    let incident_confidence = if total_score > 0.0 {
        (max_score / total_score).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let severity = match candidates[primary_idx].signal_type {
        CorrelationKind::Infrastructure => Severity::Critical,
        CorrelationKind::Metric | CorrelationKind::LogPattern => Severity::High,
        _ => Severity::Medium,
    };

    Ranking {
        candidates,
        incident_confidence,
        severity,
    }
}
