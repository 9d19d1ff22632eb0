//! Append-only deployment event log records.

use crate::types::DeploymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Self {
        match s {
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// An immutable event record attached to a deployment.
///
/// Every status transition writes one of these; rows are never updated or
/// rewritten once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub id: Uuid,
    pub deployment_id: DeploymentId,
    pub level: LogLevel,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Request to append a log entry.
#[derive(Debug, Clone)]
pub struct DeploymentLogCreateDBRequest {
    pub deployment_id: DeploymentId,
    pub level: LogLevel,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}
