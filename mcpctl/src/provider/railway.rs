//! Railway GraphQL client implementing the [`Provider`] seam.
//!
//! Every call flows through one guarded execution path: the circuit breaker
//! is consulted first, the request is sent with bearer auth and a fresh
//! `x-request-id`, and the outcome is recorded back on the breaker. Only
//! idempotent-safe operations (status/log reads, variable upserts, cancels)
//! go through the retry wrapper; service creation and deploy triggers are
//! issued exactly once per call so a flaky network cannot double-provision.

use super::graphql::{GraphqlRequest, GraphqlResponse};
use super::{
    CircuitBreaker, CircuitBreakerConfig, Provider, ProviderDeploymentStatus, ProviderError, ProviderLogLine, ProjectRef,
    RetryPolicy, ServiceCreate, ServiceRef,
};
use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_ENDPOINT: &str = "https://backboard.railway.app/graphql/v2";

/// Connection settings for the Railway API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RailwayConfig {
    pub endpoint: String,
    /// Workspace-scoped API token
    pub token: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RailwayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: String::new(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

pub struct RailwayClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl RailwayClient {
    pub fn new(config: RailwayConfig) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.endpoint).with_context(|| format!("invalid provider endpoint: {}", config.endpoint))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create provider HTTP client")?;

        Ok(Self {
            http,
            endpoint,
            token: config.token,
            retry: config.retry,
            breaker: Arc::new(CircuitBreaker::new("railway", config.circuit_breaker)),
        })
    }

    /// The breaker guarding this client, exposed for operator reset.
    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// One guarded GraphQL round-trip: breaker check, bearer auth, fresh
    /// request id, envelope unwrap, breaker bookkeeping.
    async fn execute<T: DeserializeOwned>(&self, request: &GraphqlRequest) -> Result<T, ProviderError> {
        if !self.breaker.allow_request() {
            return Err(ProviderError::CircuitOpen {
                dependency: self.breaker.dependency().to_string(),
            });
        }

        let request_id = Uuid::new_v4().to_string();
        debug!(request_id = %request_id, "Sending provider GraphQL request");

        let response = match self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header("x-request-id", &request_id)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.breaker.record_failure();
                return Err(ProviderError::Transport(err));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body: Option<serde_json::Value> = response.json().await.ok();
            let message = body
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("provider request failed")
                .to_string();
            let err = ProviderError::Api {
                status: http::StatusCode::from_u16(status.as_u16()).unwrap_or(http::StatusCode::BAD_GATEWAY),
                message,
                body,
            };
            if err.counts_as_breaker_failure() {
                self.breaker.record_failure();
            } else {
                // The provider answered; a 4xx is our mistake, not an outage
                self.breaker.record_success();
            }
            return Err(err);
        }

        let envelope: GraphqlResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(err) => {
                self.breaker.record_failure();
                return Err(ProviderError::Transport(err));
            }
        };

        self.breaker.record_success();
        envelope.into_result().map_err(|messages| ProviderError::Graphql { messages })
    }

    /// Retried variant for idempotent-safe operations.
    async fn execute_retried<T: DeserializeOwned>(&self, operation: &str, request: &GraphqlRequest) -> Result<T, ProviderError> {
        self.retry.run(operation, || self.execute::<T>(request)).await
    }
}

#[derive(Deserialize)]
struct ProjectCreateData {
    #[serde(rename = "projectCreate")]
    project_create: ProjectNode,
}

#[derive(Deserialize)]
struct ProjectNode {
    id: String,
    environments: EnvironmentConnection,
}

#[derive(Deserialize)]
struct EnvironmentConnection {
    edges: Vec<EnvironmentEdge>,
}

#[derive(Deserialize)]
struct EnvironmentEdge {
    node: EnvironmentNode,
}

#[derive(Deserialize)]
struct EnvironmentNode {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ServiceCreateData {
    #[serde(rename = "serviceCreate")]
    service_create: ServiceNode,
}

#[derive(Deserialize)]
struct ServiceNode {
    id: String,
}

#[derive(Deserialize)]
struct VariableUpsertData {
    #[serde(rename = "variableCollectionUpsert")]
    #[allow(dead_code)]
    ok: bool,
}

#[derive(Deserialize)]
struct DomainCreateData {
    #[serde(rename = "serviceDomainCreate")]
    domain_create: DomainNode,
}

#[derive(Deserialize)]
struct DomainNode {
    domain: String,
}

#[derive(Deserialize)]
struct DeployData {
    #[serde(rename = "serviceInstanceDeployV2")]
    deployment_id: String,
}

#[derive(Deserialize)]
struct DeploymentStatusData {
    deployment: DeploymentNode,
}

#[derive(Deserialize)]
struct DeploymentNode {
    status: String,
}

#[derive(Deserialize)]
struct DeploymentCancelData {
    #[serde(rename = "deploymentCancel")]
    #[allow(dead_code)]
    ok: bool,
}

#[derive(Deserialize)]
struct DeploymentLogsData {
    #[serde(rename = "deploymentLogs")]
    logs: Vec<LogNode>,
}

#[derive(Deserialize)]
struct LogNode {
    timestamp: Option<String>,
    severity: Option<String>,
    message: String,
}

#[async_trait::async_trait]
impl Provider for RailwayClient {
    #[instrument(skip(self))]
    async fn create_project(&self, name: &str) -> Result<ProjectRef, ProviderError> {
        let request = GraphqlRequest::new(
            r#"mutation projectCreate($name: String!) {
                projectCreate(input: { name: $name }) {
                    id
                    environments { edges { node { id name } } }
                }
            }"#,
            json!({ "name": name }),
        );

        let data: ProjectCreateData = self.execute(&request).await?;
        let project = data.project_create;

        // New projects come with a single "production" environment; fall back
        // to whatever exists if the provider ever renames it.
        let environment = project
            .environments
            .edges
            .iter()
            .find(|e| e.node.name == "production")
            .or_else(|| project.environments.edges.first())
            .ok_or_else(|| ProviderError::Graphql {
                messages: vec!["project created without any environment".to_string()],
            })?;

        Ok(ProjectRef {
            project_id: project.id,
            environment_id: environment.node.id.clone(),
        })
    }

    #[instrument(skip(self, request), fields(service_name = %request.name))]
    async fn create_service(&self, project_id: &str, request: &ServiceCreate) -> Result<ServiceRef, ProviderError> {
        // Image source takes precedence over a repo source
        let source = if let Some(image) = &request.image {
            json!({ "image": image })
        } else if let Some(repo) = &request.repo {
            json!({ "repo": repo })
        } else {
            serde_json::Value::Null
        };

        let create = GraphqlRequest::new(
            r#"mutation serviceCreate($projectId: String!, $name: String!, $source: ServiceSourceInput) {
                serviceCreate(input: { projectId: $projectId, name: $name, source: $source }) {
                    id
                }
            }"#,
            json!({ "projectId": project_id, "name": request.name, "source": source }),
        );

        let data: ServiceCreateData = self.execute(&create).await?;
        let service_id = data.service_create.id;

        if request.build_command.is_some() || request.start_command.is_some() {
            let update = GraphqlRequest::new(
                r#"mutation serviceInstanceUpdate($serviceId: String!, $buildCommand: String, $startCommand: String) {
                    serviceInstanceUpdate(
                        serviceId: $serviceId
                        input: { buildCommand: $buildCommand, startCommand: $startCommand }
                    )
                }"#,
                json!({
                    "serviceId": service_id,
                    "buildCommand": request.build_command,
                    "startCommand": request.start_command,
                }),
            );
            let _: serde_json::Value = self.execute(&update).await?;
        }

        Ok(ServiceRef { service_id })
    }

    #[instrument(skip(self, variables), fields(count = variables.len()))]
    async fn upsert_variables(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError> {
        let request = GraphqlRequest::new(
            r#"mutation variableCollectionUpsert($projectId: String!, $environmentId: String!, $serviceId: String!, $variables: EnvironmentVariables!) {
                variableCollectionUpsert(input: {
                    projectId: $projectId
                    environmentId: $environmentId
                    serviceId: $serviceId
                    variables: $variables
                })
            }"#,
            json!({
                "projectId": project_id,
                "environmentId": environment_id,
                "serviceId": service_id,
                "variables": variables,
            }),
        );

        let _: VariableUpsertData = self.execute_retried("upsert_variables", &request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_domain(&self, environment_id: &str, service_id: &str) -> Result<String, ProviderError> {
        let request = GraphqlRequest::new(
            r#"mutation serviceDomainCreate($environmentId: String!, $serviceId: String!) {
                serviceDomainCreate(input: { environmentId: $environmentId, serviceId: $serviceId }) {
                    domain
                }
            }"#,
            json!({ "environmentId": environment_id, "serviceId": service_id }),
        );

        let data: DomainCreateData = self.execute(&request).await?;
        Ok(data.domain_create.domain)
    }

    #[instrument(skip(self))]
    async fn trigger_deploy(&self, environment_id: &str, service_id: &str) -> Result<String, ProviderError> {
        let request = GraphqlRequest::new(
            r#"mutation serviceInstanceDeploy($environmentId: String!, $serviceId: String!) {
                serviceInstanceDeployV2(environmentId: $environmentId, serviceId: $serviceId)
            }"#,
            json!({ "environmentId": environment_id, "serviceId": service_id }),
        );

        let data: DeployData = self.execute(&request).await?;
        Ok(data.deployment_id)
    }

    #[instrument(skip(self))]
    async fn deployment_status(&self, deployment_id: &str) -> Result<ProviderDeploymentStatus, ProviderError> {
        let request = GraphqlRequest::new(
            r#"query deployment($id: String!) {
                deployment(id: $id) { status }
            }"#,
            json!({ "id": deployment_id }),
        );

        let data: DeploymentStatusData = self.execute_retried("deployment_status", &request).await?;
        Ok(ProviderDeploymentStatus::from_provider_string(&data.deployment.status))
    }

    #[instrument(skip(self))]
    async fn cancel_deployment(&self, deployment_id: &str) -> Result<(), ProviderError> {
        let request = GraphqlRequest::new(
            r#"mutation deploymentCancel($id: String!) {
                deploymentCancel(id: $id)
            }"#,
            json!({ "id": deployment_id }),
        );

        let _: DeploymentCancelData = self.execute_retried("cancel_deployment", &request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deployment_logs(&self, deployment_id: &str, limit: u32) -> Result<Vec<ProviderLogLine>, ProviderError> {
        let request = GraphqlRequest::new(
            r#"query deploymentLogs($deploymentId: String!, $limit: Int!) {
                deploymentLogs(deploymentId: $deploymentId, limit: $limit) {
                    timestamp
                    severity
                    message
                }
            }"#,
            json!({ "deploymentId": deployment_id, "limit": limit }),
        );

        let data: DeploymentLogsData = self.execute_retried("deployment_logs", &request).await?;
        Ok(data
            .logs
            .into_iter()
            .map(|log| ProviderLogLine {
                timestamp: log.timestamp,
                severity: log.severity,
                message: log.message,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(endpoint: &str) -> RailwayClient {
        RailwayClient::new(RailwayConfig {
            endpoint: endpoint.to_string(),
            token: "test-token".to_string(),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_ms: 1,
                backoff_factor: 2,
                max_backoff_ms: 5,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(60),
            },
        })
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn create_project_sends_auth_and_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(bearer_token("test-token"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "projectCreate": {
                        "id": "proj-1",
                        "environments": {
                            "edges": [
                                { "node": { "id": "env-1", "name": "production" } }
                            ]
                        }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let project = client.create_project("my-deployment").await.unwrap();

        assert_eq!(project.project_id, "proj-1");
        assert_eq!(project.environment_id, "env-1");
    }

    #[test_log::test(tokio::test)]
    async fn graphql_errors_on_200_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "Not Authorized" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.create_project("my-deployment").await.unwrap_err();

        match err {
            ProviderError::Graphql { messages } => assert_eq!(messages, vec!["Not Authorized".to_string()]),
            other => panic!("expected Graphql error, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "deployment not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.deployment_status("dep-1").await.unwrap_err();

        match err {
            ProviderError::Api { status, message, .. } => {
                assert_eq!(status, http::StatusCode::NOT_FOUND);
                assert_eq!(message, "deployment not found");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn server_errors_are_retried_until_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.deployment_status("dep-1").await.unwrap_err();

        match err {
            ProviderError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ProviderError::Api { .. }));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn open_breaker_fails_fast_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let client = test_client(&server.uri());
        for _ in 0..3 {
            client.circuit_breaker().record_failure();
        }

        let err = client.create_domain("env-1", "svc-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::CircuitOpen { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn breaker_reset_restores_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "serviceDomainCreate": { "domain": "svc.up.railway.app" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        for _ in 0..3 {
            client.circuit_breaker().record_failure();
        }
        assert!(matches!(
            client.create_domain("env-1", "svc-1").await.unwrap_err(),
            ProviderError::CircuitOpen { .. }
        ));

        client.circuit_breaker().reset();

        let domain = client.create_domain("env-1", "svc-1").await.unwrap();
        assert_eq!(domain, "svc.up.railway.app");
    }

    mod wait_for_deployment {
        use super::*;
        use std::sync::Mutex;

        /// Scripted provider: returns each status in turn, repeating the last.
        struct ScriptedProvider {
            statuses: Mutex<Vec<ProviderDeploymentStatus>>,
        }

        impl ScriptedProvider {
            fn new(statuses: Vec<ProviderDeploymentStatus>) -> Self {
                Self {
                    statuses: Mutex::new(statuses),
                }
            }
        }

        #[async_trait::async_trait]
        impl Provider for ScriptedProvider {
            async fn create_project(&self, _: &str) -> Result<ProjectRef, ProviderError> {
                unimplemented!()
            }
            async fn create_service(&self, _: &str, _: &ServiceCreate) -> Result<ServiceRef, ProviderError> {
                unimplemented!()
            }
            async fn upsert_variables(
                &self,
                _: &str,
                _: &str,
                _: &str,
                _: &BTreeMap<String, String>,
            ) -> Result<(), ProviderError> {
                unimplemented!()
            }
            async fn create_domain(&self, _: &str, _: &str) -> Result<String, ProviderError> {
                unimplemented!()
            }
            async fn trigger_deploy(&self, _: &str, _: &str) -> Result<String, ProviderError> {
                unimplemented!()
            }
            async fn deployment_status(&self, _: &str) -> Result<ProviderDeploymentStatus, ProviderError> {
                let mut statuses = self.statuses.lock().unwrap();
                if statuses.len() > 1 {
                    Ok(statuses.remove(0))
                } else {
                    Ok(statuses[0])
                }
            }
            async fn cancel_deployment(&self, _: &str) -> Result<(), ProviderError> {
                unimplemented!()
            }
            async fn deployment_logs(&self, _: &str, _: u32) -> Result<Vec<ProviderLogLine>, ProviderError> {
                unimplemented!()
            }
        }

        #[tokio::test(start_paused = true)]
        async fn resolves_when_the_deployment_succeeds() {
            let provider = ScriptedProvider::new(vec![
                ProviderDeploymentStatus::Building,
                ProviderDeploymentStatus::Deploying,
                ProviderDeploymentStatus::Success,
            ]);

            let status = provider
                .wait_for_deployment("dep-1", Duration::from_secs(300), Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(status, ProviderDeploymentStatus::Success);
        }

        #[tokio::test(start_paused = true)]
        async fn terminal_failure_is_not_a_timeout() {
            let provider = ScriptedProvider::new(vec![ProviderDeploymentStatus::Building, ProviderDeploymentStatus::Failed]);

            let err = provider
                .wait_for_deployment("dep-1", Duration::from_secs(300), Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::DeploymentFailed { ref status } if status == "FAILED"));
        }

        #[tokio::test(start_paused = true)]
        async fn gives_up_after_the_timeout() {
            let provider = ScriptedProvider::new(vec![ProviderDeploymentStatus::Building]);

            let err = provider
                .wait_for_deployment("dep-1", Duration::from_secs(30), Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::Timeout { .. }));
        }
    }
}
