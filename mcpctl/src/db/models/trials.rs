//! Deployment trial link records.

use crate::types::{DeploymentId, TrialApplicationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links a deployment to a time-boxed trial grant.
///
/// At most one non-converted trial may exist per deployment (enforced by a
/// partial unique index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTrial {
    pub id: Uuid,
    pub deployment_id: DeploymentId,
    pub trial_application_id: TrialApplicationId,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
    pub converted: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to link a deployment to a trial application.
#[derive(Debug, Clone)]
pub struct TrialCreateDBRequest {
    pub deployment_id: DeploymentId,
    pub trial_application_id: TrialApplicationId,
    pub trial_start: DateTime<Utc>,
    pub trial_end: DateTime<Utc>,
}
