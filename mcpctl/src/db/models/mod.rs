//! Database record structures matching table schemas.

pub mod deployment_logs;
pub mod deployments;
pub mod health_checks;
pub mod templates;
pub mod trials;
