//! Repository implementations for each table.

pub mod deployment_logs;
pub mod deployments;
pub mod health_checks;
pub mod repository;
pub mod templates;
pub mod trials;

pub use deployment_logs::DeploymentLogs;
pub use deployments::Deployments;
pub use health_checks::HealthChecks;
pub use repository::Repository;
pub use templates::Templates;
pub use trials::Trials;
