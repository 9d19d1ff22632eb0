//! Database repository for server templates.

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::templates::{ResourceLimits, ServerTemplate, TemplateCreateDBRequest},
};
use crate::templates::schema::EnvVarSchema;
use crate::transport::TransportType;
use crate::types::{TemplateId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter options for listing templates
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    /// Some(true) = active only, Some(false) = inactive only, None = all
    pub active: Option<bool>,
}

#[derive(FromRow)]
struct TemplateRow {
    id: TemplateId,
    name: String,
    display_name: String,
    description: Option<String>,
    github_repo: Option<String>,
    docker_image: Option<String>,
    port: i32,
    healthcheck_path: String,
    build_command: Option<String>,
    start_command: Option<String>,
    required_env_vars: Json<Vec<EnvVarSchema>>,
    optional_env_vars: Json<Vec<EnvVarSchema>>,
    default_transport_type: Option<String>,
    allowed_user_ids: Vec<UserId>,
    resources: Json<ResourceLimits>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for ServerTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            github_repo: row.github_repo,
            docker_image: row.docker_image,
            port: row.port,
            healthcheck_path: row.healthcheck_path,
            build_command: row.build_command,
            start_command: row.start_command,
            required_env_vars: row.required_env_vars.0,
            optional_env_vars: row.optional_env_vars.0,
            default_transport_type: row.default_transport_type.as_deref().and_then(TransportType::from_db_string),
            allowed_user_ids: row.allowed_user_ids,
            resources: row.resources.0,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TEMPLATE_COLUMNS: &str = "id, name, display_name, description, github_repo, docker_image, port, healthcheck_path, \
     build_command, start_command, required_env_vars, optional_env_vars, default_transport_type, \
     allowed_user_ids, resources, active, created_at, updated_at";

pub struct Templates<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Templates<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<ServerTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!("SELECT {TEMPLATE_COLUMNS} FROM server_templates WHERE name = $1"))
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(ServerTemplate::from))
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Templates<'c> {
    type CreateRequest = TemplateCreateDBRequest;
    // Templates are seeded administratively; partial updates reuse the create shape
    type UpdateRequest = TemplateCreateDBRequest;
    type Response = ServerTemplate;
    type Id = TemplateId;
    type Filter = TemplateFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            INSERT INTO server_templates (
                name, display_name, description, github_repo, docker_image, port, healthcheck_path,
                build_command, start_command, required_env_vars, optional_env_vars,
                default_transport_type, allowed_user_ids, resources, active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(request.name.trim())
        .bind(&request.display_name)
        .bind(&request.description)
        .bind(&request.github_repo)
        .bind(&request.docker_image)
        .bind(request.port)
        .bind(&request.healthcheck_path)
        .bind(&request.build_command)
        .bind(&request.start_command)
        .bind(Json(&request.required_env_vars))
        .bind(Json(&request.optional_env_vars))
        .bind(request.default_transport_type.map(|t| t.as_str()))
        .bind(&request.allowed_user_ids)
        .bind(Json(&request.resources))
        .bind(request.active)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(template_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!("SELECT {TEMPLATE_COLUMNS} FROM server_templates WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(ServerTemplate::from))
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let rows = match filter.active {
            Some(active) => {
                sqlx::query_as::<_, TemplateRow>(&format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM server_templates WHERE active = $1 ORDER BY name"
                ))
                .bind(active)
                .fetch_all(&mut *self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, TemplateRow>(&format!("SELECT {TEMPLATE_COLUMNS} FROM server_templates ORDER BY name"))
                    .fetch_all(&mut *self.db)
                    .await?
            }
        };

        Ok(rows.into_iter().map(ServerTemplate::from).collect())
    }

    #[instrument(skip(self), fields(template_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM server_templates WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(template_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            UPDATE server_templates SET
                name = $2, display_name = $3, description = $4, github_repo = $5, docker_image = $6,
                port = $7, healthcheck_path = $8, build_command = $9, start_command = $10,
                required_env_vars = $11, optional_env_vars = $12, default_transport_type = $13,
                allowed_user_ids = $14, resources = $15, active = $16, updated_at = $17
            WHERE id = $1
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.name.trim())
        .bind(&request.display_name)
        .bind(&request.description)
        .bind(&request.github_repo)
        .bind(&request.docker_image)
        .bind(request.port)
        .bind(&request.healthcheck_path)
        .bind(&request.build_command)
        .bind(&request.start_command)
        .bind(Json(&request.required_env_vars))
        .bind(Json(&request.optional_env_vars))
        .bind(request.default_transport_type.map(|t| t.as_str()))
        .bind(&request.allowed_user_ids)
        .bind(Json(&request.resources))
        .bind(request.active)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }
}
