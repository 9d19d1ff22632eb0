//! Persistence seam for the orchestration core.
//!
//! The [`Storage`] trait abstracts every database operation the orchestrator,
//! template registry, and health monitor need. [`PgStorage`] implements it
//! over a `PgPool` via the table repositories; `test_utils::MemoryStorage`
//! implements it in-memory so domain tests run without Postgres.

use crate::db::errors::Result;
use crate::db::handlers::{DeploymentLogs, Deployments, HealthChecks, Repository, Templates, Trials};
use crate::db::handlers::templates::TemplateFilter;
use crate::db::models::{
    deployment_logs::{DeploymentLog, DeploymentLogCreateDBRequest},
    deployments::{Deployment, DeploymentCreateDBRequest, DeploymentFilter, DeploymentUpdateDBRequest},
    health_checks::{HealthCheck, HealthCheckCreateDBRequest},
    templates::{ServerTemplate, TemplateCreateDBRequest},
    trials::{DeploymentTrial, TrialCreateDBRequest},
};
use crate::types::{DeploymentId, TemplateId, UserId};
use anyhow::Context;
use sqlx::PgPool;

#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    // Templates
    async fn get_template(&self, id: TemplateId) -> Result<Option<ServerTemplate>>;
    async fn get_template_by_name(&self, name: &str) -> Result<Option<ServerTemplate>>;
    /// Active templates only; visibility filtering happens above this seam.
    async fn list_templates(&self) -> Result<Vec<ServerTemplate>>;
    async fn create_template(&self, request: TemplateCreateDBRequest) -> Result<ServerTemplate>;

    // Deployments
    async fn insert_deployment(&self, request: DeploymentCreateDBRequest) -> Result<Deployment>;
    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>>;
    async fn find_deployment_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Deployment>>;
    async fn list_deployments(&self, filter: &DeploymentFilter) -> Result<Vec<Deployment>>;
    async fn update_deployment(&self, id: DeploymentId, update: DeploymentUpdateDBRequest) -> Result<Deployment>;
    async fn delete_deployment(&self, id: DeploymentId) -> Result<bool>;
    /// Deployments in a live status (deploying/running), for health coverage.
    async fn active_deployments(&self) -> Result<Vec<Deployment>>;

    // Logs
    async fn append_log(&self, request: DeploymentLogCreateDBRequest) -> Result<DeploymentLog>;
    async fn list_logs(&self, deployment_id: DeploymentId, limit: i64) -> Result<Vec<DeploymentLog>>;
    async fn delete_logs_for(&self, deployment_id: DeploymentId) -> Result<u64>;

    // Health checks
    async fn insert_health_check(&self, request: HealthCheckCreateDBRequest) -> Result<HealthCheck>;
    async fn latest_health_check(&self, deployment_id: DeploymentId) -> Result<Option<HealthCheck>>;
    async fn delete_health_checks_for(&self, deployment_id: DeploymentId) -> Result<u64>;

    // Trials
    async fn link_trial(&self, request: TrialCreateDBRequest) -> Result<DeploymentTrial>;
    async fn active_trial_for_deployment(&self, deployment_id: DeploymentId) -> Result<Option<DeploymentTrial>>;
    async fn delete_trials_for(&self, deployment_id: DeploymentId) -> Result<u64>;
}

/// Production [`Storage`] over a Postgres pool.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Storage for PgStorage {
    async fn get_template(&self, id: TemplateId) -> Result<Option<ServerTemplate>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Templates::new(&mut conn).get_by_id(id).await
    }

    async fn get_template_by_name(&self, name: &str) -> Result<Option<ServerTemplate>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Templates::new(&mut conn).get_by_name(name).await
    }

    async fn list_templates(&self) -> Result<Vec<ServerTemplate>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Templates::new(&mut conn).list(&TemplateFilter { active: Some(true) }).await
    }

    async fn create_template(&self, request: TemplateCreateDBRequest) -> Result<ServerTemplate> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Templates::new(&mut conn).create(&request).await
    }

    async fn insert_deployment(&self, request: DeploymentCreateDBRequest) -> Result<Deployment> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).create(&request).await
    }

    async fn get_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).get_by_id(id).await
    }

    async fn find_deployment_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Deployment>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).find_by_name(user_id, name).await
    }

    async fn list_deployments(&self, filter: &DeploymentFilter) -> Result<Vec<Deployment>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).list(filter).await
    }

    async fn update_deployment(&self, id: DeploymentId, update: DeploymentUpdateDBRequest) -> Result<Deployment> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).update(id, &update).await
    }

    async fn delete_deployment(&self, id: DeploymentId) -> Result<bool> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).delete(id).await
    }

    async fn active_deployments(&self) -> Result<Vec<Deployment>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Deployments::new(&mut conn).list_active().await
    }

    async fn append_log(&self, request: DeploymentLogCreateDBRequest) -> Result<DeploymentLog> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        DeploymentLogs::new(&mut conn).append(&request).await
    }

    async fn list_logs(&self, deployment_id: DeploymentId, limit: i64) -> Result<Vec<DeploymentLog>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        DeploymentLogs::new(&mut conn).list_for_deployment(deployment_id, limit).await
    }

    async fn delete_logs_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        DeploymentLogs::new(&mut conn).delete_for_deployment(deployment_id).await
    }

    async fn insert_health_check(&self, request: HealthCheckCreateDBRequest) -> Result<HealthCheck> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        HealthChecks::new(&mut conn).create(&request).await
    }

    async fn latest_health_check(&self, deployment_id: DeploymentId) -> Result<Option<HealthCheck>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        HealthChecks::new(&mut conn).latest_for_deployment(deployment_id).await
    }

    async fn delete_health_checks_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        HealthChecks::new(&mut conn).delete_for_deployment(deployment_id).await
    }

    async fn link_trial(&self, request: TrialCreateDBRequest) -> Result<DeploymentTrial> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Trials::new(&mut conn).create(&request).await
    }

    async fn active_trial_for_deployment(&self, deployment_id: DeploymentId) -> Result<Option<DeploymentTrial>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Trials::new(&mut conn).active_for_deployment(deployment_id).await
    }

    async fn delete_trials_for(&self, deployment_id: DeploymentId) -> Result<u64> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Trials::new(&mut conn).delete_for_deployment(deployment_id).await
    }
}
