//! Database repository for deployment trial links.

use crate::db::{
    errors::Result,
    models::trials::{DeploymentTrial, TrialCreateDBRequest},
};
use crate::types::{DeploymentId, TrialApplicationId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

#[derive(FromRow)]
struct TrialRow {
    id: Uuid,
    deployment_id: DeploymentId,
    trial_application_id: TrialApplicationId,
    trial_start: DateTime<Utc>,
    trial_end: DateTime<Utc>,
    converted: bool,
    created_at: DateTime<Utc>,
}

impl From<TrialRow> for DeploymentTrial {
    fn from(row: TrialRow) -> Self {
        Self {
            id: row.id,
            deployment_id: row.deployment_id,
            trial_application_id: row.trial_application_id,
            trial_start: row.trial_start,
            trial_end: row.trial_end,
            converted: row.converted,
            created_at: row.created_at,
        }
    }
}

pub struct Trials<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Trials<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Link a deployment to a trial application. The partial unique index
    /// rejects a second non-converted link for the same deployment.
    #[instrument(skip(self, request), fields(deployment_id = %abbrev_uuid(&request.deployment_id)), err)]
    pub async fn create(&mut self, request: &TrialCreateDBRequest) -> Result<DeploymentTrial> {
        let row = sqlx::query_as::<_, TrialRow>(
            r#"
            INSERT INTO deployment_trials (deployment_id, trial_application_id, trial_start, trial_end, converted, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            RETURNING id, deployment_id, trial_application_id, trial_start, trial_end, converted, created_at
            "#,
        )
        .bind(request.deployment_id)
        .bind(request.trial_application_id)
        .bind(request.trial_start)
        .bind(request.trial_end)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn active_for_deployment(&mut self, deployment_id: DeploymentId) -> Result<Option<DeploymentTrial>> {
        let row = sqlx::query_as::<_, TrialRow>(
            "SELECT id, deployment_id, trial_application_id, trial_start, trial_end, converted, created_at \
             FROM deployment_trials WHERE deployment_id = $1 AND NOT converted",
        )
        .bind(deployment_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(DeploymentTrial::from))
    }

    #[instrument(skip(self), fields(deployment_id = %abbrev_uuid(&deployment_id)), err)]
    pub async fn delete_for_deployment(&mut self, deployment_id: DeploymentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM deployment_trials WHERE deployment_id = $1")
            .bind(deployment_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
