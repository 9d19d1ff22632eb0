//! Shared test fixtures and an in-memory [`Storage`] implementation.
//!
//! `MemoryStorage` mirrors the Postgres behavior the domain logic depends
//! on — per-user deployment name uniqueness (including the categorized
//! unique-violation error), partial updates, and the one-active-trial rule —
//! so orchestrator and health tests run without a database.

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    deployment_logs::{DeploymentLog, DeploymentLogCreateDBRequest},
    deployments::{Deployment, DeploymentCreateDBRequest, DeploymentFilter, DeploymentStatus, DeploymentUpdateDBRequest},
    health_checks::{HealthCheck, HealthCheckCreateDBRequest, HealthStatus},
    templates::{ResourceLimits, ServerTemplate, TemplateCreateDBRequest},
    trials::{DeploymentTrial, TrialCreateDBRequest},
};
use crate::db::storage::Storage;
use crate::types::{DeploymentId, TemplateId, UserId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A public, active template with no env var schemas. Tests that exercise
/// validation attach their own schemas.
pub fn template_fixture(name: &str) -> ServerTemplate {
    let now = Utc::now();
    ServerTemplate {
        id: Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        github_repo: None,
        docker_image: Some(format!("ghcr.io/example/{name}:latest")),
        port: 3000,
        healthcheck_path: "/health".to_string(),
        build_command: None,
        start_command: None,
        required_env_vars: Vec::new(),
        optional_env_vars: Vec::new(),
        default_transport_type: None,
        allowed_user_ids: Vec::new(),
        resources: ResourceLimits::default(),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn template_create_request_fixture(name: &str) -> TemplateCreateDBRequest {
    TemplateCreateDBRequest {
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        github_repo: None,
        docker_image: Some(format!("ghcr.io/example/{name}:latest")),
        port: 3000,
        healthcheck_path: "/health".to_string(),
        build_command: None,
        start_command: None,
        required_env_vars: Vec::new(),
        optional_env_vars: Vec::new(),
        default_transport_type: None,
        allowed_user_ids: Vec::new(),
        resources: ResourceLimits::default(),
        active: true,
    }
}

#[derive(Default)]
struct MemoryState {
    templates: HashMap<TemplateId, ServerTemplate>,
    deployments: HashMap<DeploymentId, Deployment>,
    logs: Vec<DeploymentLog>,
    health_checks: Vec<HealthCheck>,
    trials: Vec<DeploymentTrial>,
}

/// In-memory [`Storage`] for tests.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-formed template, returning its id.
    pub fn seed_template(&self, template: ServerTemplate) -> TemplateId {
        let id = template.id;
        self.state.lock().unwrap().templates.insert(id, template);
        id
    }
}

fn name_conflict(name: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some("deployments_user_id_deployment_name_key".to_string()),
        table: Some("deployments".to_string()),
        message: format!("duplicate key value violates unique constraint: {name}"),
        conflicting_value: Some(name.to_string()),
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get_template(&self, id: TemplateId) -> Result<Option<ServerTemplate>> {
        Ok(self.state.lock().unwrap().templates.get(&id).cloned())
    }

    async fn get_template_by_name(&self, name: &str) -> Result<Option<ServerTemplate>> {
        Ok(self.state.lock().unwrap().templates.values().find(|t| t.name == name).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<ServerTemplate>> {
        let state = self.state.lock().unwrap();
        let mut templates: Vec<_> = state.templates.values().filter(|t| t.active).cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn create_template(&self, request: TemplateCreateDBRequest) -> Result<ServerTemplate> {
        let now = Utc::now();
        let template = ServerTemplate {
            id: Uuid::new_v4(),
            name: request.name,
            display_name: request.display_name,
            description: request.description,
            github_repo: request.github_repo,
            docker_image: request.docker_image,
            port: request.port,
            healthcheck_path: request.healthcheck_path,
            build_command: request.build_command,
            start_command: request.start_command,
            required_env_vars: request.required_env_vars,
            optional_env_vars: request.optional_env_vars,
            default_transport_type: request.default_transport_type,
            allowed_user_ids: request.allowed_user_ids,
            resources: request.resources,
            active: request.active,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn insert_deployment(&self, request: DeploymentCreateDBRequest) -> Result<Deployment> {
        let mut state = self.state.lock().unwrap();

        let taken = state
            .deployments
            .values()
            .any(|d| d.user_id == request.user_id && d.deployment_name == request.deployment_name);
        if taken {
            return Err(name_conflict(&request.deployment_name));
        }

        let now = Utc::now();
        let deployment = Deployment {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            deployment_name: request.deployment_name,
            server_template_id: request.server_template_id,
            server_config: request.server_config,
            advanced_config: request.advanced_config,
            status: DeploymentStatus::Pending,
            health_status: HealthStatus::Unknown,
            service_url: None,
            provider_project_id: None,
            provider_service_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.deployments.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        Ok(self.state.lock().unwrap().deployments.get(&id).cloned())
    }

    async fn find_deployment_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Deployment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .values()
            .find(|d| d.user_id == user_id && d.deployment_name == name)
            .cloned())
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> Result<Vec<Deployment>> {
        let state = self.state.lock().unwrap();
        let mut deployments: Vec<_> = state
            .deployments
            .values()
            .filter(|d| filter.user_id.is_none_or(|u| d.user_id == u))
            .filter(|d| filter.server_template_id.is_none_or(|t| d.server_template_id == t))
            .filter(|d| filter.statuses.as_ref().is_none_or(|s| s.contains(&d.status)))
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deployments
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update_deployment(&self, id: DeploymentId, update: DeploymentUpdateDBRequest) -> Result<Deployment> {
        let mut state = self.state.lock().unwrap();

        if let Some(name) = &update.deployment_name {
            let owner = state.deployments.get(&id).ok_or(DbError::NotFound)?.user_id;
            let taken = state
                .deployments
                .values()
                .any(|d| d.id != id && d.user_id == owner && &d.deployment_name == name);
            if taken {
                return Err(name_conflict(name));
            }
        }

        let deployment = state.deployments.get_mut(&id).ok_or(DbError::NotFound)?;
        if let Some(name) = update.deployment_name {
            deployment.deployment_name = name;
        }
        if let Some(config) = update.server_config {
            deployment.server_config = config;
        }
        if let Some(status) = update.status {
            deployment.status = status;
        }
        if let Some(health_status) = update.health_status {
            deployment.health_status = health_status;
        }
        if let Some(service_url) = update.service_url {
            deployment.service_url = service_url;
        }
        if let Some(project_id) = update.provider_project_id {
            deployment.provider_project_id = project_id;
        }
        if let Some(service_id) = update.provider_service_id {
            deployment.provider_service_id = service_id;
        }
        if let Some(error_message) = update.error_message {
            deployment.error_message = error_message;
        }
        deployment.updated_at = Utc::now();
        Ok(deployment.clone())
    }

    async fn delete_deployment(&self, id: DeploymentId) -> Result<bool> {
        Ok(self.state.lock().unwrap().deployments.remove(&id).is_some())
    }

    async fn active_deployments(&self) -> Result<Vec<Deployment>> {
        let state = self.state.lock().unwrap();
        let mut deployments: Vec<_> = state.deployments.values().filter(|d| d.status.is_active()).cloned().collect();
        deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(deployments)
    }

    async fn append_log(&self, request: DeploymentLogCreateDBRequest) -> Result<DeploymentLog> {
        let log = DeploymentLog {
            id: Uuid::new_v4(),
            deployment_id: request.deployment_id,
            level: request.level,
            message: request.message,
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().logs.push(log.clone());
        Ok(log)
    }

    async fn list_logs(&self, deployment_id: DeploymentId, limit: i64) -> Result<Vec<DeploymentLog>> {
        let state = self.state.lock().unwrap();
        let mut logs: Vec<_> = state.logs.iter().filter(|l| l.deployment_id == deployment_id).cloned().collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit as usize);
        Ok(logs)
    }

    async fn delete_logs_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.logs.len();
        state.logs.retain(|l| l.deployment_id != deployment_id);
        Ok((before - state.logs.len()) as u64)
    }

    async fn insert_health_check(&self, request: HealthCheckCreateDBRequest) -> Result<HealthCheck> {
        let check = HealthCheck {
            id: Uuid::new_v4(),
            deployment_id: request.deployment_id,
            status: request.status,
            response_time_ms: request.response_time_ms,
            status_code: request.status_code,
            error_message: request.error_message,
            checked_at: request.checked_at,
        };
        self.state.lock().unwrap().health_checks.push(check.clone());
        Ok(check)
    }

    async fn latest_health_check(&self, deployment_id: DeploymentId) -> Result<Option<HealthCheck>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .health_checks
            .iter()
            .filter(|c| c.deployment_id == deployment_id)
            .max_by_key(|c| c.checked_at)
            .cloned())
    }

    async fn delete_health_checks_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.health_checks.len();
        state.health_checks.retain(|c| c.deployment_id != deployment_id);
        Ok((before - state.health_checks.len()) as u64)
    }

    async fn link_trial(&self, request: TrialCreateDBRequest) -> Result<DeploymentTrial> {
        let mut state = self.state.lock().unwrap();

        if state.trials.iter().any(|t| t.deployment_id == request.deployment_id && !t.converted) {
            return Err(DbError::UniqueViolation {
                constraint: Some("deployment_trials_active_idx".to_string()),
                table: Some("deployment_trials".to_string()),
                message: "deployment already has an active trial".to_string(),
                conflicting_value: None,
            });
        }

        let trial = DeploymentTrial {
            id: Uuid::new_v4(),
            deployment_id: request.deployment_id,
            trial_application_id: request.trial_application_id,
            trial_start: request.trial_start,
            trial_end: request.trial_end,
            converted: false,
            created_at: Utc::now(),
        };
        state.trials.push(trial.clone());
        Ok(trial)
    }

    async fn active_trial_for_deployment(&self, deployment_id: DeploymentId) -> Result<Option<DeploymentTrial>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .trials
            .iter()
            .find(|t| t.deployment_id == deployment_id && !t.converted)
            .cloned())
    }

    async fn delete_trials_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.trials.len();
        state.trials.retain(|t| t.deployment_id != deployment_id);
        Ok((before - state.trials.len()) as u64)
    }
}
