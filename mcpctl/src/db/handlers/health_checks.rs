//! Database repository for health check results.

use crate::db::{
    errors::Result,
    models::health_checks::{HealthCheck, HealthCheckCreateDBRequest, HealthStatus},
};
use crate::types::{DeploymentId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

#[derive(FromRow)]
struct HealthCheckRow {
    id: Uuid,
    deployment_id: DeploymentId,
    status: String,
    response_time_ms: Option<i32>,
    status_code: Option<i32>,
    error_message: Option<String>,
    checked_at: DateTime<Utc>,
}

impl From<HealthCheckRow> for HealthCheck {
    fn from(row: HealthCheckRow) -> Self {
        Self {
            id: row.id,
            deployment_id: row.deployment_id,
            status: HealthStatus::from_db_string(&row.status),
            response_time_ms: row.response_time_ms,
            status_code: row.status_code,
            error_message: row.error_message,
            checked_at: row.checked_at,
        }
    }
}

pub struct HealthChecks<'c> {
    db: &'c mut PgConnection,
}

impl<'c> HealthChecks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(deployment_id = %abbrev_uuid(&request.deployment_id)), err)]
    pub async fn create(&mut self, request: &HealthCheckCreateDBRequest) -> Result<HealthCheck> {
        let row = sqlx::query_as::<_, HealthCheckRow>(
            r#"
            INSERT INTO health_checks (deployment_id, status, response_time_ms, status_code, error_message, checked_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, deployment_id, status, response_time_ms, status_code, error_message, checked_at
            "#,
        )
        .bind(request.deployment_id)
        .bind(request.status.to_db_string())
        .bind(request.response_time_ms)
        .bind(request.status_code)
        .bind(&request.error_message)
        .bind(request.checked_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    /// The single most recent check by `checked_at`. This row alone decides
    /// the deployment's derived health status.
    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn latest_for_deployment(&mut self, deployment_id: DeploymentId) -> Result<Option<HealthCheck>> {
        let row = sqlx::query_as::<_, HealthCheckRow>(
            "SELECT id, deployment_id, status, response_time_ms, status_code, error_message, checked_at \
             FROM health_checks WHERE deployment_id = $1 ORDER BY checked_at DESC LIMIT 1",
        )
        .bind(deployment_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(HealthCheck::from))
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn delete_for_deployment(&mut self, deployment_id: DeploymentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM health_checks WHERE deployment_id = $1")
            .bind(deployment_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
