//! Database repository for the append-only deployment event log.

use crate::db::{
    errors::Result,
    models::deployment_logs::{DeploymentLog, DeploymentLogCreateDBRequest, LogLevel},
};
use crate::types::{DeploymentId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

#[derive(FromRow)]
struct LogRow {
    id: Uuid,
    deployment_id: DeploymentId,
    level: String,
    message: String,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<LogRow> for DeploymentLog {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            deployment_id: row.deployment_id,
            level: LogLevel::from_db_string(&row.level),
            message: row.message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

/// Append-only: rows are inserted and eventually deleted with their parent
/// deployment, never updated.
pub struct DeploymentLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> DeploymentLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(deployment_id = %abbrev_uuid(&request.deployment_id)), err)]
    pub async fn append(&mut self, request: &DeploymentLogCreateDBRequest) -> Result<DeploymentLog> {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            INSERT INTO deployment_logs (deployment_id, level, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, deployment_id, level, message, metadata, created_at
            "#,
        )
        .bind(request.deployment_id)
        .bind(request.level.to_db_string())
        .bind(&request.message)
        .bind(&request.metadata)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn list_for_deployment(&mut self, deployment_id: DeploymentId, limit: i64) -> Result<Vec<DeploymentLog>> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, deployment_id, level, message, metadata, created_at FROM deployment_logs \
             WHERE deployment_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(deployment_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows.into_iter().map(DeploymentLog::from).collect())
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn delete_for_deployment(&mut self, deployment_id: DeploymentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM deployment_logs WHERE deployment_id = $1")
            .bind(deployment_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
