//! Resilient client layer for the external deployment provider.
//!
//! The concrete implementation ([`railway::RailwayClient`]) speaks GraphQL
//! over HTTPS; the [`Provider`] trait is the seam the orchestrator depends
//! on, so tests can inject a fake without a network.

pub mod circuit_breaker;
pub mod graphql;
pub mod railway;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use railway::RailwayClient;
pub use retry::RetryPolicy;

use http::StatusCode;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Errors raised by the provider client layer.
#[derive(ThisError, Debug)]
pub enum ProviderError {
    /// Non-2xx HTTP response from the provider; carries the raw body
    #[error("Provider API error ({status}): {message}")]
    Api {
        status: StatusCode,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// 2xx response whose GraphQL envelope carried errors
    #[error("Provider rejected the operation: {}", messages.join("; "))]
    Graphql { messages: Vec<String> },

    /// Fail-fast rejection while the breaker is open
    #[error("Service unavailable: circuit breaker open for {dependency}")]
    CircuitOpen { dependency: String },

    /// All retry attempts spent; wraps the last underlying cause
    #[error("Retries exhausted after {attempts} attempt(s)")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },

    /// `wait_for_deployment` gave up; distinct from a deployment failure
    #[error("Timed out after {waited:?} waiting for deployment to settle")]
    Timeout { waited: Duration },

    /// The provider reported the deployment itself failed
    #[error("Deployment failed with provider status {status}")]
    DeploymentFailed { status: String },

    /// Network/transport failure before a response was received
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether the retry wrapper may attempt this operation again.
    ///
    /// Transport failures and 5xx/429 responses are transient; everything
    /// else (validation, auth/permission, breaker-open, timeouts) fails
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            ProviderError::Graphql { .. } => false,
            ProviderError::CircuitOpen { .. } => false,
            ProviderError::RetryExhausted { .. } => false,
            ProviderError::Timeout { .. } => false,
            ProviderError::DeploymentFailed { .. } => false,
        }
    }

    /// Whether this failure should count against the dependency's circuit
    /// breaker. Tenant-caused rejections (4xx, GraphQL validation) do not
    /// indicate provider unavailability.
    pub(crate) fn counts_as_breaker_failure(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

/// Provider-side reference to a created project and its base environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub project_id: String,
    pub environment_id: String,
}

/// Provider-side reference to a created service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    pub service_id: String,
}

/// Source and commands for a new service.
#[derive(Debug, Clone, Default)]
pub struct ServiceCreate {
    pub name: String,
    /// Container image; takes precedence over `repo`
    pub image: Option<String>,
    /// GitHub `owner/repo` source reference
    pub repo: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
}

/// Deployment status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderDeploymentStatus {
    Queued,
    Building,
    Deploying,
    Success,
    Failed,
    Crashed,
    Removed,
}

impl ProviderDeploymentStatus {
    pub fn from_provider_string(s: &str) -> Self {
        match s {
            "BUILDING" => ProviderDeploymentStatus::Building,
            "DEPLOYING" => ProviderDeploymentStatus::Deploying,
            "SUCCESS" => ProviderDeploymentStatus::Success,
            "FAILED" => ProviderDeploymentStatus::Failed,
            "CRASHED" => ProviderDeploymentStatus::Crashed,
            "REMOVED" => ProviderDeploymentStatus::Removed,
            _ => ProviderDeploymentStatus::Queued,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderDeploymentStatus::Success
                | ProviderDeploymentStatus::Failed
                | ProviderDeploymentStatus::Crashed
                | ProviderDeploymentStatus::Removed
        )
    }
}

/// One provider-side log line for a deployment.
#[derive(Debug, Clone)]
pub struct ProviderLogLine {
    pub timestamp: Option<String>,
    pub severity: Option<String>,
    pub message: String,
}

/// The deployment provider seam consumed by the orchestrator.
///
/// Only designated idempotent-safe operations are retried internally (status
/// queries, variable upserts, reads); `create_service` and `trigger_deploy`
/// are issued exactly once per call to avoid duplicate provisioning.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn create_project(&self, name: &str) -> Result<ProjectRef, ProviderError>;

    async fn create_service(&self, project_id: &str, request: &ServiceCreate) -> Result<ServiceRef, ProviderError>;

    /// Atomic collection upsert of the service's environment variables.
    async fn upsert_variables(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError>;

    /// Generate a public domain for the service; returns the bare domain.
    async fn create_domain(&self, environment_id: &str, service_id: &str) -> Result<String, ProviderError>;

    /// Trigger a deployment of the current service instance; returns the
    /// provider deployment id.
    async fn trigger_deploy(&self, environment_id: &str, service_id: &str) -> Result<String, ProviderError>;

    async fn deployment_status(&self, deployment_id: &str) -> Result<ProviderDeploymentStatus, ProviderError>;

    async fn cancel_deployment(&self, deployment_id: &str) -> Result<(), ProviderError>;

    async fn deployment_logs(&self, deployment_id: &str, limit: u32) -> Result<Vec<ProviderLogLine>, ProviderError>;

    /// Poll `deployment_status` on a fixed interval until a terminal status
    /// or the timeout elapses. A timeout raises [`ProviderError::Timeout`],
    /// distinct from [`ProviderError::DeploymentFailed`].
    async fn wait_for_deployment(
        &self,
        deployment_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<ProviderDeploymentStatus, ProviderError> {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let status = self.deployment_status(deployment_id).await?;
            match status {
                ProviderDeploymentStatus::Success => return Ok(status),
                ProviderDeploymentStatus::Failed | ProviderDeploymentStatus::Crashed | ProviderDeploymentStatus::Removed => {
                    return Err(ProviderError::DeploymentFailed {
                        status: format!("{status:?}").to_uppercase(),
                    });
                }
                _ => {}
            }

            if started.elapsed() >= timeout {
                return Err(ProviderError::Timeout { waited: started.elapsed() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable_but_rate_limits_are() {
        let not_found = ProviderError::Api {
            status: StatusCode::NOT_FOUND,
            message: "not found".to_string(),
            body: None,
        };
        assert!(!not_found.is_retryable());

        let rate_limited = ProviderError::Api {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".to_string(),
            body: None,
        };
        assert!(rate_limited.is_retryable());

        let server_error = ProviderError::Api {
            status: StatusCode::BAD_GATEWAY,
            message: "bad gateway".to_string(),
            body: None,
        };
        assert!(server_error.is_retryable());
    }

    #[test]
    fn breaker_open_and_graphql_rejections_fail_immediately() {
        let open = ProviderError::CircuitOpen {
            dependency: "railway".to_string(),
        };
        assert!(!open.is_retryable());
        assert!(!open.counts_as_breaker_failure());

        let rejected = ProviderError::Graphql {
            messages: vec!["Not Authorized".to_string()],
        };
        assert!(!rejected.is_retryable());
        assert!(!rejected.counts_as_breaker_failure());
    }

    #[test]
    fn provider_status_parsing() {
        assert_eq!(
            ProviderDeploymentStatus::from_provider_string("SUCCESS"),
            ProviderDeploymentStatus::Success
        );
        assert_eq!(
            ProviderDeploymentStatus::from_provider_string("INITIALIZING"),
            ProviderDeploymentStatus::Queued
        );
        assert!(ProviderDeploymentStatus::Failed.is_terminal());
        assert!(!ProviderDeploymentStatus::Building.is_terminal());
    }
}
