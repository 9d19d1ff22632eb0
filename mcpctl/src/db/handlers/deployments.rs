//! Database repository for tenant deployments.

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::{
        deployments::{AdvancedConfig, Deployment, DeploymentCreateDBRequest, DeploymentFilter, DeploymentStatus, DeploymentUpdateDBRequest},
        health_checks::HealthStatus,
    },
};
use crate::types::{DeploymentId, TemplateId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::query_builder::QueryBuilder;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(FromRow)]
struct DeploymentRow {
    id: DeploymentId,
    user_id: UserId,
    deployment_name: String,
    server_template_id: TemplateId,
    server_config: Json<BTreeMap<String, String>>,
    advanced_config: Json<AdvancedConfig>,
    status: String,
    health_status: String,
    service_url: Option<String>,
    provider_project_id: Option<String>,
    provider_service_id: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            deployment_name: row.deployment_name,
            server_template_id: row.server_template_id,
            server_config: row.server_config.0,
            advanced_config: row.advanced_config.0,
            status: DeploymentStatus::from_db_string(&row.status),
            health_status: HealthStatus::from_db_string(&row.health_status),
            service_url: row.service_url,
            provider_project_id: row.provider_project_id,
            provider_service_id: row.provider_service_id,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const DEPLOYMENT_COLUMNS: &str = "id, user_id, deployment_name, server_template_id, server_config, advanced_config, \
     status, health_status, service_url, provider_project_id, provider_service_id, error_message, \
     created_at, updated_at";

pub struct Deployments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Deployments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Exact-name lookup within a user's namespace, used by the name
    /// reservation pre-check.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn find_by_name(&mut self, user_id: UserId, deployment_name: &str) -> Result<Option<Deployment>> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE user_id = $1 AND deployment_name = $2"
        ))
        .bind(user_id)
        .bind(deployment_name)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Deployment::from))
    }

    /// All deployments in a status that health monitoring covers.
    #[instrument(skip(self), err)]
    pub async fn list_active(&mut self) -> Result<Vec<Deployment>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE status IN ('deploying', 'running') ORDER BY created_at"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows.into_iter().map(Deployment::from).collect())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Deployments<'c> {
    type CreateRequest = DeploymentCreateDBRequest;
    type UpdateRequest = DeploymentUpdateDBRequest;
    type Response = Deployment;
    type Id = DeploymentId;
    type Filter = DeploymentFilter;

    #[instrument(skip(self, request), fields(deployment_name = %request.deployment_name, user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            r#"
            INSERT INTO deployments (
                user_id, deployment_name, server_template_id, server_config, advanced_config,
                status, health_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {DEPLOYMENT_COLUMNS}
            "#
        ))
        .bind(request.user_id)
        .bind(request.deployment_name.trim())
        .bind(request.server_template_id)
        .bind(Json(&request.server_config))
        .bind(Json(&request.advanced_config))
        .bind(DeploymentStatus::Pending.to_db_string())
        .bind(HealthStatus::Unknown.to_db_string())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Deployment::from))
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut builder = QueryBuilder::new(format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE 1=1"));

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(template_id) = filter.server_template_id {
            builder.push(" AND server_template_id = ").push_bind(template_id);
        }
        if let Some(statuses) = &filter.statuses {
            let status_strings: Vec<String> = statuses.iter().map(|s| s.to_db_string().to_string()).collect();
            builder.push(" AND status = ANY(").push_bind(status_strings).push(")");
        }

        builder.push(" ORDER BY created_at DESC");
        builder.push(" OFFSET ").push_bind(filter.skip);
        builder.push(" LIMIT ").push_bind(filter.limit);

        let rows = builder.build_query_as::<DeploymentRow>().fetch_all(&mut *self.db).await?;

        Ok(rows.into_iter().map(Deployment::from).collect())
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deployments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(deployment_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut builder = QueryBuilder::new("UPDATE deployments SET updated_at = ");
        builder.push_bind(Utc::now());

        if let Some(name) = &request.deployment_name {
            builder.push(", deployment_name = ").push_bind(name.trim().to_string());
        }
        if let Some(config) = &request.server_config {
            builder.push(", server_config = ").push_bind(Json(config.clone()));
        }
        if let Some(status) = &request.status {
            builder.push(", status = ").push_bind(status.to_db_string());
        }
        if let Some(health_status) = &request.health_status {
            builder.push(", health_status = ").push_bind(health_status.to_db_string());
        }
        // Double-Option fields: outer None leaves the column untouched,
        // Some(None) clears it
        if let Some(service_url) = &request.service_url {
            builder.push(", service_url = ").push_bind(service_url.clone());
        }
        if let Some(project_id) = &request.provider_project_id {
            builder.push(", provider_project_id = ").push_bind(project_id.clone());
        }
        if let Some(service_id) = &request.provider_service_id {
            builder.push(", provider_service_id = ").push_bind(service_id.clone());
        }
        if let Some(error_message) = &request.error_message {
            builder.push(", error_message = ").push_bind(error_message.clone());
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.push(format!(" RETURNING {DEPLOYMENT_COLUMNS}"));

        let row = builder.build_query_as::<DeploymentRow>().fetch_one(&mut *self.db).await?;

        Ok(row.into())
    }
}
