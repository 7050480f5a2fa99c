//! Loki-compatible log aggregator adapter
//!
//! Error-log queries, recurring-pattern detection over recent lines and
//! log pushes. The health probe hits `/metrics` rather than `/ready`
//! because the ready endpoint returns 503 during ring initialization;
//! that state maps to degraded, not unhealthy.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use relops_common::{Error, Result};
use relops_stability::{guarded, CircuitBreaker, HealthState, RetryConfig};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    map_status_error, map_transport_error, LogAdapter, LogEntry, HEALTH_TIMEOUT, QUERY_TIMEOUT,
};

/// Canonical log patterns scanned for, with their match needles
const LOG_PATTERNS: &[(&str, &[&str])] = &[
    ("Database connection timeout", &["database", "db timeout"]),
    ("Connection refused", &["connection refused", "econnrefused"]),
    ("Request timeout", &["timeout", "timed out", "etimedout"]),
    ("Out of memory", &["out of memory", "oomkilled", "oom"]),
    ("Panic", &["panic", "fatal"]),
];

/// How many lines a pattern scan inspects at most
const PATTERN_SCAN_LIMIT: usize = 500;

/// Adapter over the Loki HTTP API
pub struct LokiAdapter {
    base_url: String,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[allow(dead_code)]
    status: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Deserialize, Default)]
struct QueryData {
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    stream: HashMap<String, String>,
    /// (nanosecond timestamp string, log line) pairs
    #[serde(default)]
    values: Vec<(String, String)>,
}

impl LokiAdapter {
    pub fn new(base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build log client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
            breaker,
            retry: RetryConfig::default(),
        })
    }

    async fn query_range(
        &self,
        logql: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let url = format!("{}/loki/api/v1/query_range", self.base_url);
        let params = [
            ("query", logql.to_string()),
            ("start", nanos(since).to_string()),
            ("end", nanos(Utc::now()).to_string()),
            ("limit", limit.to_string()),
            ("direction", "backward".to_string()),
        ];

        let response = guarded(&self.breaker, &self.retry, "loki_query_range", || {
            let url = url.clone();
            let params = params.clone();
            async move {
                let response = self
                    .http
                    .get(&url)
                    .query(&params)
                    .send()
                    .await
                    .map_err(|e| map_transport_error("loki", e))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(map_status_error("loki", status, &body));
                }

                response
                    .json::<QueryResponse>()
                    .await
                    .map_err(|e| Error::Adapter(format!("loki response decode failed: {e}")))
            }
        })
        .await?;

        let mut entries = Vec::new();
        for stream in response.data.result {
            let level = stream
                .stream
                .get("level")
                .cloned()
                .unwrap_or_else(|| "info".to_string());
            for (ts, line) in &stream.values {
                entries.push(LogEntry {
                    timestamp: from_nanos(ts),
                    level: level.clone(),
                    message: line.clone(),
                    labels: stream.stream.clone(),
                });
            }
        }
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

#[async_trait]
impl LogAdapter for LokiAdapter {
    async fn error_logs(
        &self,
        service: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let logql = format!("{{service=\"{service}\",level=\"error\"}}");
        self.query_range(&logql, since, limit).await
    }

    async fn detect_patterns(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, u64>> {
        let logql = format!("{{service=\"{service}\"}}");
        let entries = self.query_range(&logql, since, PATTERN_SCAN_LIMIT).await?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &entries {
            let line = entry.message.to_lowercase();
            for (pattern, needles) in LOG_PATTERNS {
                if needles.iter().any(|needle| line.contains(needle)) {
                    *counts.entry((*pattern).to_string()).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn push_log(
        &self,
        service: &str,
        level: &str,
        message: &str,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        let mut stream = labels.clone();
        stream.insert("service".to_string(), service.to_string());
        stream.insert("level".to_string(), level.to_string());

        let body = json!({
            "streams": [{
                "stream": stream,
                "values": [[nanos(Utc::now()).to_string(), message]]
            }]
        });

        let url = format!("{}/loki/api/v1/push", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("loki", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error("loki", status, &body));
        }
        Ok(())
    }

    async fn root_cause_hint(&self, service: &str, window: Duration) -> Result<String> {
        let since = Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();
        let patterns = self.detect_patterns(service, since).await?;

        let dominant = patterns
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));
        match dominant {
            Some((pattern, count)) => Ok(format!(
                "Dominant error pattern: {pattern} ({count} occurrences)"
            )),
            None => Ok("No dominant error pattern found in recent logs".to_string()),
        }
    }

    async fn health(&self) -> Result<HealthState> {
        let url = format!("{}/metrics", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error("loki", e))?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(HealthState::Healthy)
        } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            // Ring startup; responding but not ready yet
            Ok(HealthState::Degraded)
        } else {
            Err(Error::Upstream(format!("loki returned status {status}")))
        }
    }
}

fn nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn from_nanos(raw: &str) -> DateTime<Utc> {
    raw.parse::<i64>()
        .ok()
        .and_then(|ns| Utc.timestamp_opt(ns / 1_000_000_000, (ns % 1_000_000_000) as u32).single())
        .unwrap_or_else(Utc::now)
}
