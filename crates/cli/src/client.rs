//! API client for communicating with the optimizer service

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the optimizer's reporting endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

/// Engine-level aggregate counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub total_plans: usize,
    pub total_executions: usize,
    pub successful_actions: usize,
    pub failed_actions: usize,
    pub rollback_count: usize,
    pub total_actual_savings: f64,
    pub average_execution_secs: f64,
}

/// Per-executor aggregate counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorMetrics {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub rollback_count: usize,
    pub average_execution_secs: f64,
    pub active_operations: usize,
}

/// Safety manager aggregate counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyMetrics {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub rollbacks_attempted: usize,
    pub rollbacks_succeeded: usize,
    pub average_check_duration_ms: f64,
}

/// Health endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub components: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_engine_metrics() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/metrics/optimization")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "total_plans": 3,
                    "total_executions": 2,
                    "successful_actions": 5,
                    "failed_actions": 1,
                    "rollback_count": 1,
                    "total_actual_savings": 420.5,
                    "average_execution_secs": 12.0
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let metrics: EngineMetrics = client.get("/api/v1/metrics/optimization").await.unwrap();

        assert_eq!(metrics.total_plans, 3);
        assert_eq!(metrics.successful_actions, 5);
        assert!((metrics.total_actual_savings - 420.5).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/metrics/safety")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result: Result<SafetyMetrics> = client.get("/api/v1/metrics/safety").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("500"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
