//! Deployment records and the deployment status state machine.

use crate::transport::TransportType;
use crate::types::{DeploymentId, TemplateId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::health_checks::HealthStatus;

/// Lifecycle status of a deployment.
///
/// Forward path: `pending -> validating -> building -> deploying -> running`.
/// `failed` and `crashed` are reachable from any non-terminal state;
/// `removed` is the terminal deletion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Validating,
    Building,
    Deploying,
    Running,
    Failed,
    Crashed,
    Removed,
}

impl DeploymentStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Validating => "validating",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Crashed => "crashed",
            DeploymentStatus::Removed => "removed",
        }
    }

    pub fn from_db_string(s: &str) -> Self {
        match s {
            "validating" => DeploymentStatus::Validating,
            "building" => DeploymentStatus::Building,
            "deploying" => DeploymentStatus::Deploying,
            "running" => DeploymentStatus::Running,
            "failed" => DeploymentStatus::Failed,
            "crashed" => DeploymentStatus::Crashed,
            "removed" => DeploymentStatus::Removed,
            _ => DeploymentStatus::Pending,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Removed)
    }

    /// Whether the deployment is considered live for health monitoring.
    pub fn is_active(&self) -> bool {
        matches!(self, DeploymentStatus::Deploying | DeploymentStatus::Running)
    }

    /// Position on the forward path, used to enforce monotonic movement.
    fn rank(&self) -> Option<u8> {
        match self {
            DeploymentStatus::Pending => Some(0),
            DeploymentStatus::Validating => Some(1),
            DeploymentStatus::Building => Some(2),
            DeploymentStatus::Deploying => Some(3),
            DeploymentStatus::Running => Some(4),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Status moves monotonically forward along the happy path. `failed` and
    /// `crashed` are reachable from any non-terminal state, and a failed or
    /// crashed deployment may be retried back to `pending` or removed.
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match next {
            DeploymentStatus::Failed | DeploymentStatus::Crashed => true,
            DeploymentStatus::Removed => true,
            // Explicit retry path
            DeploymentStatus::Pending => matches!(self, DeploymentStatus::Failed | DeploymentStatus::Crashed),
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

/// Validated deployment-time settings recorded alongside the tenant config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvancedConfig {
    pub transport_type: TransportType,
}

/// A tenant's running or pending MCP server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub user_id: UserId,
    /// Unique within the owning user's namespace; auto-suffixed on collision
    pub deployment_name: String,
    pub server_template_id: TemplateId,
    /// Validated tenant configuration, kept as an opaque key/value map
    pub server_config: BTreeMap<String, String>,
    pub advanced_config: AdvancedConfig,
    pub status: DeploymentStatus,
    pub health_status: HealthStatus,
    /// Public base URL once the provider has generated a domain
    pub service_url: Option<String>,
    pub provider_project_id: Option<String>,
    pub provider_service_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to insert a deployment row.
#[derive(Debug, Clone)]
pub struct DeploymentCreateDBRequest {
    pub user_id: UserId,
    pub deployment_name: String,
    pub server_template_id: TemplateId,
    pub server_config: BTreeMap<String, String>,
    pub advanced_config: AdvancedConfig,
}

/// Partial update for a deployment row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct DeploymentUpdateDBRequest {
    pub deployment_name: Option<String>,
    pub server_config: Option<BTreeMap<String, String>>,
    pub status: Option<DeploymentStatus>,
    pub health_status: Option<HealthStatus>,
    pub service_url: Option<Option<String>>,
    pub provider_project_id: Option<Option<String>>,
    pub provider_service_id: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
}

/// Filter options for listing deployments
#[derive(Debug, Clone)]
pub struct DeploymentFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
    pub statuses: Option<Vec<DeploymentStatus>>,
    pub server_template_id: Option<TemplateId>,
}

impl DeploymentFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            user_id: None,
            statuses: None,
            server_template_id: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<DeploymentStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.server_template_id = Some(template_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_moves_forward_only() {
        use DeploymentStatus::*;
        assert!(Pending.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Building));
        assert!(Building.can_transition_to(Deploying));
        assert!(Deploying.can_transition_to(Running));
        // Skipping ahead is allowed, moving backwards is not
        assert!(Pending.can_transition_to(Running));
        assert!(!Running.can_transition_to(Building));
        assert!(!Deploying.can_transition_to(Pending));
    }

    #[test]
    fn failure_states_reachable_from_any_non_terminal_state() {
        use DeploymentStatus::*;
        for from in [Pending, Validating, Building, Deploying, Running] {
            assert!(from.can_transition_to(Failed), "{from:?} -> failed");
            assert!(from.can_transition_to(Crashed), "{from:?} -> crashed");
        }
        assert!(!Removed.can_transition_to(Failed));
    }

    #[test]
    fn removed_is_terminal() {
        use DeploymentStatus::*;
        assert!(Running.can_transition_to(Removed));
        assert!(Failed.can_transition_to(Removed));
        for next in [Pending, Validating, Building, Deploying, Running, Failed, Crashed] {
            assert!(!Removed.can_transition_to(next));
        }
    }

    #[test]
    fn retry_only_from_failure_states() {
        use DeploymentStatus::*;
        assert!(Failed.can_transition_to(Pending));
        assert!(Crashed.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn db_string_round_trip() {
        use DeploymentStatus::*;
        for status in [Pending, Validating, Building, Deploying, Running, Failed, Crashed, Removed] {
            assert_eq!(DeploymentStatus::from_db_string(status.to_db_string()), status);
        }
    }
}
