//! Prometheus client for querying PTP metrics.
//!
//! Only instant queries are needed: the clock state assertions sample the
//! current value of a gauge on every poll.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ScenarioConfig, DEFAULT_PROMETHEUS_URL};

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL for the Prometheus API
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Accept self-signed certificates
    pub insecure: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROMETHEUS_URL.to_string(),
            token: None,
            insecure: false,
            timeout_secs: 30,
        }
    }
}

impl From<&ScenarioConfig> for PrometheusConfig {
    fn from(config: &ScenarioConfig) -> Self {
        Self {
            base_url: config.prometheus_url.clone(),
            token: config.prometheus_token.clone(),
            insecure: config.prometheus_insecure,
            ..Self::default()
        }
    }
}

/// Prometheus query response
#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    data: Option<PrometheusData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(rename = "resultType")]
    #[allow(dead_code)]
    result_type: String,
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    metric: HashMap<String, String>,
    value: Option<(f64, String)>,
}

/// A metric sample from Prometheus
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    /// Labels associated with this metric
    pub labels: HashMap<String, String>,
    /// The metric value
    pub value: f64,
    /// Timestamp of the sample
    pub timestamp: DateTime<Utc>,
}

/// Prometheus client for querying metrics
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    config: PrometheusConfig,
    client: reqwest::Client,
}

impl PrometheusClient {
    /// Create a new Prometheus client with the given configuration.
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let request = self.client.get(url);

        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Execute an instant query.
    ///
    /// # Errors
    /// Returns an error if the query fails or response cannot be parsed.
    pub async fn query(&self, query: &str) -> Result<Vec<MetricSample>> {
        debug!(query = %query, "Executing Prometheus query");

        let response = self
            .request("/api/v1/query")
            .query(&[("query", query)])
            .send()
            .await
            .context("Failed to send request to Prometheus")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prometheus query failed with status {status}: {body}");
        }

        let prom_response: PrometheusResponse = response
            .json()
            .await
            .context("Failed to parse Prometheus response")?;

        if prom_response.status != "success" {
            anyhow::bail!(
                "Prometheus query returned status {}: {}",
                prom_response.status,
                prom_response.error.unwrap_or_default()
            );
        }

        let results = prom_response
            .data
            .map(|data| data.result)
            .unwrap_or_default();

        Ok(parse_results(&results))
    }

    /// Check Prometheus health.
    ///
    /// # Errors
    /// Returns an error if there's an issue building the request.
    pub async fn health_check(&self) -> Result<bool> {
        match self.request("/-/healthy").send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!(error = %e, "Prometheus health check failed");
                Ok(false)
            }
        }
    }
}

/// Parse instant query results, skipping series without a value.
fn parse_results(results: &[PrometheusResult]) -> Vec<MetricSample> {
    let mut samples = Vec::new();

    for result in results {
        if let Some((timestamp, value_str)) = &result.value {
            let value: f64 = value_str.parse().unwrap_or(f64::NAN);
            let ts = DateTime::from_timestamp(*timestamp as i64, 0).unwrap_or_else(Utc::now);

            samples.push(MetricSample {
                labels: result.metric.clone(),
                value,
                timestamp: ts,
            });
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PrometheusConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.token.is_none());
        assert!(!config.insecure);
    }

    #[test]
    fn test_config_from_scenario() {
        let scenario = ScenarioConfig {
            prometheus_url: "http://localhost:9090".to_string(),
            prometheus_token: Some("secret".to_string()),
            prometheus_insecure: true,
            ..ScenarioConfig::default()
        };
        let config = PrometheusConfig::from(&scenario);

        assert_eq!(config.base_url, "http://localhost:9090");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(config.insecure);
    }

    #[test]
    fn test_parse_results() {
        let raw = r#"[
            {"metric": {"node": "worker-0", "process": "phc2sys"}, "value": [1717545600.5, "1"]},
            {"metric": {"node": "worker-1"}, "value": [1717545600, "garbage"]},
            {"metric": {"node": "worker-2"}}
        ]"#;
        let results: Vec<PrometheusResult> = serde_json::from_str(raw).unwrap();
        let samples = parse_results(&results);

        assert_eq!(samples.len(), 2);
        assert!((samples[0].value - 1.0).abs() < f64::EPSILON);
        assert_eq!(samples[0].labels["process"], "phc2sys");
        assert_eq!(samples[0].timestamp.timestamp(), 1_717_545_600);
        assert!(samples[1].value.is_nan());
    }
}
