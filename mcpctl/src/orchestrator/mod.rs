//! Deployment orchestration: the write-side coordinator that turns a tenant
//! request into a validated, named, provisioned deployment.
//!
//! The orchestrator owns the deployment lifecycle end to end: name
//! reservation, template access, configuration validation, the status state
//! machine, provider provisioning, and deletion fan-out. It talks to
//! persistence only through [`Storage`] and to the deployment provider only
//! through the [`Provider`] trait, so every path here is testable without
//! Postgres or a network.

use crate::adapters::{AdapterRegistry, GenericAdapter, ServerAdapter};
use crate::audit::AuditSink;
use crate::db::models::{
    deployment_logs::{DeploymentLogCreateDBRequest, LogLevel},
    deployments::{AdvancedConfig, Deployment, DeploymentCreateDBRequest, DeploymentFilter, DeploymentStatus, DeploymentUpdateDBRequest},
    templates::ServerTemplate,
};
use crate::db::models::trials::TrialCreateDBRequest;
use crate::db::storage::Storage;
use crate::errors::{Error, Result};
use crate::provider::{Provider, ProviderError, ServiceCreate};
use crate::transport::{TransportType, resolve_transport_type};
use crate::types::{DeploymentId, TemplateId, TrialApplicationId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How many suffixed name candidates to try before giving up
    pub name_attempts: u32,
    /// How long `provision` waits for the provider to settle a deployment
    #[serde(with = "humantime_serde")]
    pub deploy_timeout: Duration,
    /// Poll interval while waiting for a deployment to settle
    #[serde(with = "humantime_serde")]
    pub deploy_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name_attempts: 20,
            deploy_timeout: Duration::from_secs(300),
            deploy_poll_interval: Duration::from_secs(5),
        }
    }
}

/// A time-boxed trial grant to link to the new deployment.
#[derive(Debug, Clone)]
pub struct TrialGrant {
    pub trial_application_id: TrialApplicationId,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
}

/// Tenant-facing request to create a deployment.
#[derive(Debug, Clone)]
pub struct CreateDeploymentRequest {
    pub user_id: UserId,
    pub deployment_name: String,
    pub template_id: TemplateId,
    pub config: BTreeMap<String, String>,
    /// Explicit transport selection; falls through to the template default
    pub transport_type: Option<TransportType>,
    /// Best-effort: link failure never rolls back the deployment
    pub trial: Option<TrialGrant>,
}

/// Tenant-facing partial update.
#[derive(Debug, Clone, Default)]
pub struct UpdateDeploymentRequest {
    pub deployment_name: Option<String>,
    pub server_config: Option<BTreeMap<String, String>>,
}

pub struct Orchestrator<S: Storage> {
    store: Arc<S>,
    adapters: AdapterRegistry,
    audit: Arc<dyn AuditSink>,
    config: OrchestratorConfig,
}

impl<S: Storage> Orchestrator<S> {
    pub fn new(store: Arc<S>, adapters: AdapterRegistry, audit: Arc<dyn AuditSink>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            adapters,
            audit,
            config,
        }
    }

    /// The adapter for a template: the registered bespoke one, or the
    /// schema-driven generic fallback.
    fn adapter_for(&self, template: &ServerTemplate) -> Box<dyn ServerAdapter> {
        if self.adapters.is_supported(&template.name) {
            // Registered names always construct
            self.adapters.create_adapter(&template.name).unwrap_or_else(|_| Box::new(GenericAdapter))
        } else {
            Box::new(GenericAdapter)
        }
    }

    async fn resolve_template(&self, template_id: TemplateId, user_id: UserId) -> Result<ServerTemplate> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| Error::TemplateNotFound {
                id: template_id.to_string(),
            })?;

        if !template.is_public() && !template.allowed_user_ids.contains(&user_id) {
            return Err(Error::TemplateAccessDenied {
                id: template_id.to_string(),
            });
        }

        Ok(template)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), requested_name = %request.deployment_name))]
    pub async fn create_deployment(&self, request: CreateDeploymentRequest) -> Result<Deployment> {
        let template = self.resolve_template(request.template_id, request.user_id).await?;

        let adapter = self.adapter_for(&template);
        let outcome = adapter.validate_config(&request.config, &template.required_env_vars, &template.optional_env_vars);
        if !outcome.valid {
            return Err(Error::ValidationFailed { errors: outcome.errors });
        }

        let advanced_config = AdvancedConfig {
            transport_type: resolve_transport_type(request.transport_type, template.default_transport_type),
        };

        let deployment = self
            .reserve_and_insert(&request, &template, advanced_config)
            .await?;

        self.store
            .append_log(DeploymentLogCreateDBRequest {
                deployment_id: deployment.id,
                level: LogLevel::Info,
                message: format!("Deployment created from template '{}'", template.name),
                metadata: Some(json!({ "status": deployment.status.to_db_string() })),
            })
            .await?;

        // Best-effort trial link; failure is recorded but never rolls the
        // deployment back
        if let Some(trial) = &request.trial {
            let link = self
                .store
                .link_trial(TrialCreateDBRequest {
                    deployment_id: deployment.id,
                    trial_application_id: trial.trial_application_id,
                    trial_start: trial.trial_start,
                    trial_end: trial.trial_end,
                })
                .await;
            if let Err(e) = link {
                warn!(deployment_id = %abbrev_uuid(&deployment.id), error = %e, "Failed to link trial to deployment");
            }
        }

        if let Err(e) = self
            .audit
            .record("deployment.create", request.user_id, deployment.id, None)
            .await
        {
            warn!(error = %e, "Audit record failed for deployment creation");
        }

        info!(
            deployment_id = %abbrev_uuid(&deployment.id),
            deployment_name = %deployment.deployment_name,
            "Deployment created"
        );
        Ok(deployment)
    }

    /// Reserve a unique name and insert the pending row.
    ///
    /// First-fit numeric suffixing: `name`, `name-1`, `name-2`, ... The
    /// existence pre-check is an optimization; the database unique constraint
    /// is authoritative, so a conflicting insert (lost race) advances to the
    /// next candidate instead of failing.
    async fn reserve_and_insert(
        &self,
        request: &CreateDeploymentRequest,
        template: &ServerTemplate,
        advanced_config: AdvancedConfig,
    ) -> Result<Deployment> {
        let requested = request.deployment_name.trim();

        for attempt in 0..self.config.name_attempts {
            let candidate = if attempt == 0 {
                requested.to_string()
            } else {
                format!("{requested}-{attempt}")
            };

            if self.store.find_deployment_by_name(request.user_id, &candidate).await?.is_some() {
                continue;
            }

            let insert = self
                .store
                .insert_deployment(DeploymentCreateDBRequest {
                    user_id: request.user_id,
                    deployment_name: candidate.clone(),
                    server_template_id: template.id,
                    server_config: request.config.clone(),
                    advanced_config: advanced_config.clone(),
                })
                .await;

            match insert {
                Ok(deployment) => return Ok(deployment),
                Err(e) if e.is_deployment_name_conflict() => {
                    info!(candidate = %candidate, "Deployment name taken concurrently, trying next suffix");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::NameExhausted {
            requested: requested.to_string(),
            attempts: self.config.name_attempts,
        })
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&id)))]
    pub async fn get_deployment(&self, id: DeploymentId) -> Result<Deployment> {
        self.store.get_deployment(id).await?.ok_or_else(|| Error::NotFound {
            resource: "Deployment".to_string(),
            id: id.to_string(),
        })
    }

    pub async fn list_deployments(&self, filter: &DeploymentFilter) -> Result<Vec<Deployment>> {
        Ok(self.store.list_deployments(filter).await?)
    }

    /// Deployments currently live (deploying or running) for one user.
    pub async fn get_user_active_deployments(&self, user_id: UserId) -> Result<Vec<Deployment>> {
        let filter = DeploymentFilter::new(0, 500)
            .with_user(user_id)
            .with_statuses(vec![DeploymentStatus::Deploying, DeploymentStatus::Running]);
        Ok(self.store.list_deployments(&filter).await?)
    }

    #[instrument(skip(self, request), fields(deployment_id = %abbrev_uuid(&id)))]
    pub async fn update_deployment(&self, id: DeploymentId, request: UpdateDeploymentRequest) -> Result<Deployment> {
        let deployment = self.get_deployment(id).await?;

        // Config changes are re-validated against the template schemas
        if let Some(config) = &request.server_config {
            let template = self.resolve_template(deployment.server_template_id, deployment.user_id).await?;
            let adapter = self.adapter_for(&template);
            let outcome = adapter.validate_config(config, &template.required_env_vars, &template.optional_env_vars);
            if !outcome.valid {
                return Err(Error::ValidationFailed { errors: outcome.errors });
            }
        }

        let updated = self
            .store
            .update_deployment(
                id,
                DeploymentUpdateDBRequest {
                    deployment_name: request.deployment_name,
                    server_config: request.server_config,
                    ..Default::default()
                },
            )
            .await?;

        if let Err(e) = self.audit.record("deployment.update", updated.user_id, id, None).await {
            warn!(error = %e, "Audit record failed for deployment update");
        }

        Ok(updated)
    }

    /// Delete a deployment and everything attached to it.
    ///
    /// Children go first (logs, health checks, trials), then the parent row.
    /// Any fan-out failure propagates so a partial delete is visible to the
    /// caller rather than silently leaving orphans.
    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&id)))]
    pub async fn delete_deployment(&self, id: DeploymentId) -> Result<()> {
        let deployment = self.get_deployment(id).await?;

        self.store.delete_logs_for(id).await?;
        self.store.delete_health_checks_for(id).await?;
        self.store.delete_trials_for(id).await?;

        if !self.store.delete_deployment(id).await? {
            return Err(Error::NotFound {
                resource: "Deployment".to_string(),
                id: id.to_string(),
            });
        }

        if let Err(e) = self.audit.record("deployment.delete", deployment.user_id, id, None).await {
            warn!(error = %e, "Audit record failed for deployment deletion");
        }

        info!(deployment_id = %abbrev_uuid(&id), "Deployment deleted");
        Ok(())
    }

    /// Advance the status state machine, writing one immutable log entry per
    /// transition.
    async fn transition(&self, deployment: &Deployment, next: DeploymentStatus, message: &str) -> Result<Deployment> {
        if !deployment.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: deployment.status.to_db_string(),
                to: next.to_db_string(),
            });
        }

        let updated = self
            .store
            .update_deployment(
                deployment.id,
                DeploymentUpdateDBRequest {
                    status: Some(next),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .append_log(DeploymentLogCreateDBRequest {
                deployment_id: deployment.id,
                level: LogLevel::Info,
                message: message.to_string(),
                metadata: Some(json!({
                    "from": deployment.status.to_db_string(),
                    "to": next.to_db_string(),
                })),
            })
            .await?;

        Ok(updated)
    }

    /// Record a provider failure: status `failed`, cause persisted, error log
    /// entry appended.
    async fn mark_failed(&self, deployment: &Deployment, cause: &str) -> Result<()> {
        self.store
            .update_deployment(
                deployment.id,
                DeploymentUpdateDBRequest {
                    status: Some(DeploymentStatus::Failed),
                    error_message: Some(Some(cause.to_string())),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .append_log(DeploymentLogCreateDBRequest {
                deployment_id: deployment.id,
                level: LogLevel::Error,
                message: format!("Deployment failed: {cause}"),
                metadata: Some(json!({
                    "from": deployment.status.to_db_string(),
                    "to": DeploymentStatus::Failed.to_db_string(),
                })),
            })
            .await?;

        Ok(())
    }

    /// Drive a pending deployment through provider provisioning to `running`.
    ///
    /// Any provider failure marks the deployment `failed` with the cause and
    /// returns the original error.
    #[instrument(skip(self, provider), fields(deployment_id = %abbrev_uuid(&deployment_id)))]
    pub async fn provision(&self, deployment_id: DeploymentId, provider: &dyn Provider) -> Result<Deployment> {
        let deployment = self.get_deployment(deployment_id).await?;
        let template = self
            .store
            .get_template(deployment.server_template_id)
            .await?
            .ok_or_else(|| Error::TemplateNotFound {
                id: deployment.server_template_id.to_string(),
            })?;
        let adapter = self.adapter_for(&template);

        let deployment = self.transition(&deployment, DeploymentStatus::Validating, "Validating configuration").await?;

        if let Err(reason) = adapter.validate_server_connection(&deployment.server_config).await {
            self.mark_failed(&deployment, &format!("Upstream connection check failed: {reason}")).await?;
            return Err(Error::ValidationFailed {
                errors: vec![crate::adapters::ValidationError {
                    field: "connection".to_string(),
                    message: reason,
                }],
            });
        }

        match self.provision_inner(&deployment, &template, adapter.as_ref(), provider).await {
            Ok(running) => Ok(running),
            Err(e) => {
                self.mark_failed(&deployment, &e.to_string()).await?;
                Err(e.into())
            }
        }
    }

    async fn provision_inner(
        &self,
        deployment: &Deployment,
        template: &ServerTemplate,
        adapter: &dyn ServerAdapter,
        provider: &dyn Provider,
    ) -> std::result::Result<Deployment, ProviderError> {
        let project = provider.create_project(&deployment.deployment_name).await?;
        let service = provider
            .create_service(
                &project.project_id,
                &ServiceCreate {
                    name: deployment.deployment_name.clone(),
                    image: template.docker_image.clone(),
                    repo: template.github_repo.clone(),
                    build_command: template.build_command.clone(),
                    start_command: template.start_command.clone(),
                },
            )
            .await?;

        let env = adapter.transform_config(&deployment.server_config, template);
        provider
            .upsert_variables(&project.project_id, &project.environment_id, &service.service_id, &env)
            .await?;

        let domain = provider.create_domain(&project.environment_id, &service.service_id).await?;
        let service_url = format!("https://{domain}");

        let deployment = self
            .store
            .update_deployment(
                deployment.id,
                DeploymentUpdateDBRequest {
                    service_url: Some(Some(service_url)),
                    provider_project_id: Some(Some(project.project_id.clone())),
                    provider_service_id: Some(Some(service.service_id.clone())),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ProviderError::Graphql {
                messages: vec![format!("failed to persist provider references: {e}")],
            })?;

        let deployment = self
            .transition(&deployment, DeploymentStatus::Building, "Provider build started")
            .await
            .map_err(provider_side)?;

        let provider_deployment_id = provider.trigger_deploy(&project.environment_id, &service.service_id).await?;

        let deployment = self
            .transition(&deployment, DeploymentStatus::Deploying, "Deployment triggered")
            .await
            .map_err(provider_side)?;

        provider
            .wait_for_deployment(&provider_deployment_id, self.config.deploy_timeout, self.config.deploy_poll_interval)
            .await?;

        self.transition(&deployment, DeploymentStatus::Running, "Deployment running")
            .await
            .map_err(provider_side)
    }
}

/// Fold orchestration-side errors into the provider error channel used by
/// `provision_inner` so one failure path marks the deployment failed.
fn provider_side(e: Error) -> ProviderError {
    ProviderError::Graphql {
        messages: vec![e.to_string()],
    }
}
