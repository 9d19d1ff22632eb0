//! Server template records.

use crate::templates::schema::EnvVarSchema;
use crate::transport::TransportType;
use crate::types::{TemplateId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource sizing applied to deployments created from a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourceLimits {
    /// Fractional vCPUs, e.g. 0.5
    pub cpu: f64,
    pub memory_mb: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { cpu: 0.5, memory_mb: 512 }
    }
}

/// A deployable MCP server type.
///
/// The `required_env_vars` schema is the sole source of truth for
/// configuration validation; adapters and the generic validator both derive
/// their checks from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTemplate {
    pub id: TemplateId,
    /// Internal name, unique, e.g. `emailbison-mcp`
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// GitHub source reference (`owner/repo`), used when no image is set
    pub github_repo: Option<String>,
    /// Container image reference; takes precedence over `github_repo`
    pub docker_image: Option<String>,
    /// Port the server listens on inside the container
    pub port: i32,
    pub healthcheck_path: String,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub required_env_vars: Vec<EnvVarSchema>,
    pub optional_env_vars: Vec<EnvVarSchema>,
    /// Template-level transport preference; `None` falls through to the
    /// system default
    pub default_transport_type: Option<TransportType>,
    /// Access allow-list; empty means the template is public
    pub allowed_user_ids: Vec<UserId>,
    pub resources: ResourceLimits,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerTemplate {
    /// Whether every tenant may deploy this template.
    pub fn is_public(&self) -> bool {
        self.allowed_user_ids.is_empty()
    }
}

/// Request to insert a template row (seeding and administrative onboarding).
#[derive(Debug, Clone, Default)]
pub struct TemplateCreateDBRequest {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub github_repo: Option<String>,
    pub docker_image: Option<String>,
    pub port: i32,
    pub healthcheck_path: String,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub required_env_vars: Vec<EnvVarSchema>,
    pub optional_env_vars: Vec<EnvVarSchema>,
    pub default_transport_type: Option<TransportType>,
    pub allowed_user_ids: Vec<UserId>,
    pub resources: ResourceLimits,
    pub active: bool,
}
