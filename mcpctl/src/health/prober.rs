//! HTTP probe execution against deployment health endpoints.

use super::HealthPolicy;
use crate::db::models::health_checks::HealthCheckCreateDBRequest;
use crate::types::DeploymentId;
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::time::Instant;
use tracing::debug;

/// Executes health check requests against deployment endpoints.
///
/// The prober maintains one HTTP client and measures response times; it
/// returns a check record regardless of outcome so every probe attempt is
/// captured.
pub struct HealthProber {
    client: Client,
    policy: HealthPolicy,
}

impl HealthProber {
    pub fn new(policy: HealthPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .context("Failed to create health probe HTTP client")?;
        Ok(Self { client, policy })
    }

    /// Probe one deployment's health URL and classify the outcome.
    pub async fn probe(&self, deployment_id: DeploymentId, health_url: &str) -> HealthCheckCreateDBRequest {
        let start = Instant::now();
        let response = self.client.get(health_url).send().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) => {
                let status_code = resp.status().as_u16();
                let status = self.policy.classify(Some(status_code), elapsed_ms);
                debug!(%deployment_id, status_code, elapsed_ms, health_status = ?status, "Health probe completed");

                let error_message = if !(200..300).contains(&status_code) {
                    Some(format!("HTTP {status_code}"))
                } else {
                    None
                };

                HealthCheckCreateDBRequest {
                    deployment_id,
                    status,
                    response_time_ms: Some(elapsed_ms as i32),
                    status_code: Some(status_code as i32),
                    error_message,
                    checked_at: Utc::now(),
                }
            }
            Err(e) => {
                debug!(%deployment_id, elapsed_ms, error = %e, "Health probe failed");
                HealthCheckCreateDBRequest {
                    deployment_id,
                    status: self.policy.classify(None, elapsed_ms),
                    response_time_ms: Some(elapsed_ms as i32),
                    status_code: None,
                    error_message: Some(e.to_string()),
                    checked_at: Utc::now(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::health_checks::HealthStatus;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober() -> HealthProber {
        HealthProber::new(HealthPolicy {
            check_interval: Duration::from_secs(60),
            request_timeout: Duration::from_millis(500),
            degraded_latency_ms: 2_000,
            sync_interval: Duration::from_secs(30),
        })
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn a_fast_200_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let check = prober().probe(Uuid::new_v4(), &format!("{}/health", server.uri())).await;

        assert_eq!(check.status, HealthStatus::Healthy);
        assert_eq!(check.status_code, Some(200));
        assert!(check.error_message.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn a_server_error_is_unhealthy_with_the_status_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let check = prober().probe(Uuid::new_v4(), &format!("{}/health", server.uri())).await;

        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.status_code, Some(503));
        assert_eq!(check.error_message.as_deref(), Some("HTTP 503"));
    }

    #[test_log::test(tokio::test)]
    async fn an_unreachable_endpoint_is_unhealthy_without_a_status_code() {
        // Nothing listens on this port
        let check = prober().probe(Uuid::new_v4(), "http://127.0.0.1:1/health").await;

        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert!(check.status_code.is_none());
        assert!(check.error_message.is_some());
    }
}
