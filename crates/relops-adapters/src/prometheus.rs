//! Prometheus-compatible metrics adapter
//!
//! Instant and range queries plus the derived per-service rates the
//! correlation engine and investigator consume. Metric pushes go through
//! a Pushgateway-style sink when one is reachable; its absence is not an
//! error, since metrics are scraped on the next interval anyway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relops_common::{Error, Result};
use relops_stability::{guarded, CircuitBreaker, HealthState, RetryConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{
    map_status_error, map_transport_error, MetricSample, MetricsAdapter, RangeSeries,
    HEALTH_TIMEOUT, QUERY_TIMEOUT,
};

/// Adapter over the Prometheus HTTP API
pub struct PrometheusAdapter {
    base_url: String,
    push_url: Option<String>,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: ApiData,
}

#[derive(Debug, Deserialize, Default)]
struct ApiData {
    #[serde(rename = "resultType", default)]
    #[allow(dead_code)]
    result_type: String,
    #[serde(default)]
    result: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PrometheusAdapter {
    pub fn new(base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Result<Self> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build metrics client: {e}")))?;

        // Pushgateway conventionally sits next to the store on :9091
        let push_url = if base_url.contains(":9090") {
            Some(base_url.replace(":9090", ":9091"))
        } else {
            None
        };

        Ok(Self {
            base_url,
            push_url,
            http,
            breaker,
            retry: RetryConfig::default(),
        })
    }

    /// Override the push sink endpoint
    pub fn with_push_url(mut self, push_url: Option<String>) -> Self {
        self.push_url = push_url;
        self
    }

    async fn api_get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        guarded(&self.breaker, &self.retry, path, || {
            let url = url.clone();
            async move {
                let response = self
                    .http
                    .get(&url)
                    .query(params)
                    .send()
                    .await
                    .map_err(|e| map_transport_error("prometheus", e))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(map_status_error("prometheus", status, &body));
                }

                let parsed: ApiResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Adapter(format!("prometheus response decode failed: {e}")))?;
                if parsed.status != "success" {
                    return Err(Error::InvalidQuery(format!(
                        "prometheus query status: {}",
                        parsed.status
                    )));
                }
                Ok(parsed)
            }
        })
        .await
    }

    /// Run an instant query and take the first finite sample value
    async fn first_value(&self, query: &str) -> Result<f64> {
        let samples = self.query(query, None).await?;
        Ok(samples
            .first()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0))
    }
}

#[async_trait]
impl MetricsAdapter for PrometheusAdapter {
    async fn query(&self, query: &str, at: Option<DateTime<Utc>>) -> Result<Vec<MetricSample>> {
        let time = at.unwrap_or_else(Utc::now).timestamp();
        let params = [
            ("query", query.to_string()),
            ("time", time.to_string()),
        ];
        let response = self.api_get("/api/v1/query", &params).await?;

        let samples = response
            .data
            .result
            .into_iter()
            .filter_map(|r| {
                let (timestamp, raw) = r.value?;
                // Unparsable or non-finite values are skipped, not failed
                let value: f64 = raw.parse().ok()?;
                Some(MetricSample {
                    labels: r.metric,
                    value,
                    timestamp,
                })
            })
            .collect();
        Ok(samples)
    }

    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<RangeSeries>> {
        let params = [
            ("query", query.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", format!("{}s", step.as_secs().max(1))),
        ];
        let response = self.api_get("/api/v1/query_range", &params).await?;

        let series = response
            .data
            .result
            .into_iter()
            .map(|r| RangeSeries {
                labels: r.metric,
                values: r
                    .values
                    .into_iter()
                    .filter_map(|(ts, raw)| raw.parse::<f64>().ok().map(|v| (ts, v)))
                    .collect(),
            })
            .collect();
        Ok(series)
    }

    async fn error_rate(&self, service: &str) -> Result<f64> {
        let query = format!(
            "rate(http_requests_total{{service=\"{service}\",status=~\"5..\"}}[5m]) \
             / rate(http_requests_total{{service=\"{service}\"}}[5m]) * 100"
        );
        self.first_value(&query).await
    }

    async fn latency_p95(&self, service: &str) -> Result<f64> {
        let query = format!(
            "histogram_quantile(0.95, \
             rate(http_request_duration_seconds_bucket{{service=\"{service}\"}}[5m]))"
        );
        // The quantile is in seconds; callers reason in milliseconds
        Ok(self.first_value(&query).await? * 1000.0)
    }

    async fn request_rate(&self, service: &str) -> Result<f64> {
        let query = format!("rate(http_requests_total{{service=\"{service}\"}}[5m])");
        self.first_value(&query).await
    }

    async fn error_ratio(&self, service: &str) -> Result<f64> {
        let query = format!(
            "sum(rate(http_requests_total{{service=\"{service}\",status=~\"5..\"}}[5m])) \
             / sum(rate(http_requests_total{{service=\"{service}\"}}[5m]))"
        );
        self.first_value(&query).await
    }

    async fn availability(&self, service: &str, window_days: u32) -> Result<f64> {
        let query = format!(
            "(sum(rate(http_requests_total{{service=\"{service}\",status!~\"5..\"}}[{window_days}d])) \
             / sum(rate(http_requests_total{{service=\"{service}\"}}[{window_days}d]))) * 100"
        );
        self.first_value(&query).await
    }

    async fn push_counter(
        &self,
        name: &str,
        value: f64,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        self.push_metric(name, value, labels).await
    }

    async fn push_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        self.push_metric(name, value, labels).await
    }

    async fn health(&self) -> Result<HealthState> {
        let url = format!("{}/-/healthy", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error("prometheus", e))?;

        if response.status().is_success() {
            Ok(HealthState::Healthy)
        } else {
            Err(Error::Upstream(format!(
                "prometheus health endpoint returned {}",
                response.status()
            )))
        }
    }
}

impl PrometheusAdapter {
    async fn push_metric(
        &self,
        name: &str,
        value: f64,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        let Some(push_url) = &self.push_url else {
            return Ok(());
        };

        let mut job_path = String::from("relops");
        let mut sorted: Vec<_> = labels.iter().collect();
        sorted.sort();
        for (k, v) in &sorted {
            if !k.is_empty() && !v.is_empty() {
                job_path.push_str(&format!("/{k}/{v}"));
            }
        }
        let url = format!("{push_url}/metrics/job/{job_path}");
        let body = metric_line(name, value, labels);

        match self
            .http
            .post(&url)
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                debug!("push sink returned {}, metric will be scraped instead", response.status());
                Ok(())
            }
            Err(e) => {
                debug!("push sink unavailable ({e}), metric will be scraped instead");
                Ok(())
            }
        }
    }
}

/// Build a metric line in the exposition text format
fn metric_line(name: &str, value: f64, labels: &HashMap<String, String>) -> String {
    if labels.is_empty() {
        return format!("{name} {value}\n");
    }
    let mut pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
        .collect();
    pairs.sort();
    format!("{name}{{{}}} {value}\n", pairs.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer) -> PrometheusAdapter {
        PrometheusAdapter::new(server.uri(), Arc::new(CircuitBreaker::new("prometheus"))).unwrap()
    }

    fn instant_body(results: serde_json::Value) -> serde_json::Value {
        json!({
            "status": "success",
            "data": { "resultType": "vector", "result": results }
        })
    }

    #[tokio::test]
    async fn instant_query_parses_samples() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(instant_body(json!([
                {
                    "metric": {"service": "payment-service"},
                    "value": [1700000000.0, "0.30"]
                },
                {
                    "metric": {"service": "user-service"},
                    "value": [1700000000.0, "not-a-number"]
                }
            ]))))
            .mount(&server)
            .await;

        let samples = adapter_for(&server)
            .query("rate(http_requests_total[5m])", None)
            .await
            .unwrap();

        // The unparsable sample is skipped, not an error
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels["service"], "payment-service");
        assert!((samples[0].value - 0.30).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_result_yields_zero_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(instant_body(json!([]))))
            .mount(&server)
            .await;

        let rate = adapter_for(&server).error_rate("payment-service").await.unwrap();
        assert_eq!(rate, 0.0);
    }

    #[tokio::test]
    async fn latency_converts_seconds_to_millis() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(instant_body(json!([
                { "metric": {}, "value": [1700000000.0, "1.5"] }
            ]))))
            .mount(&server)
            .await;

        let p95 = adapter_for(&server).latency_p95("payment-service").await.unwrap();
        assert!((p95 - 1500.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn parse_error_surfaces_as_invalid_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(400).set_body_string("parse error at char 5"))
            .mount(&server)
            .await;

        let err = adapter_for(&server)
            .query("rate(broken", None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "invalid_query");
    }

    #[tokio::test]
    async fn range_query_sends_step() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("step", "60s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "resultType": "matrix",
                    "result": [
                        {
                            "metric": {"service": "api-gateway"},
                            "values": [[1700000000.0, "1.0"], [1700000060.0, "2.0"]]
                        }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let series = adapter_for(&server)
            .query_range(
                "rate(http_requests_total[5m])",
                Utc::now() - chrono::Duration::hours(1),
                Utc::now(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].values.len(), 2);
    }

    #[tokio::test]
    async fn push_without_sink_is_not_an_error() {
        let server = MockServer::start().await;
        let adapter = adapter_for(&server).with_push_url(None);
        let result = adapter
            .push_counter("http_requests_total", 1.0, &HashMap::new())
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn metric_line_formats_labels() {
        let mut labels = HashMap::new();
        labels.insert("service".to_string(), "api".to_string());
        labels.insert("method".to_string(), "GET".to_string());
        let line = metric_line("http_requests_total", 1.0, &labels);
        assert_eq!(line, "http_requests_total{method=\"GET\",service=\"api\"} 1\n");
    }
}
