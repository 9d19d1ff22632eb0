//! # mcpctl: Deployment Orchestration for Hosted MCP Servers
//!
//! `mcpctl` is the control plane for deploying third-party MCP (Model Context
//! Protocol) servers as managed, single-tenant workloads on an external
//! deployment provider. It validates tenant configuration against declarative
//! template schemas, reserves per-user deployment names, drives provider
//! provisioning through a resilient GraphQL client, and keeps deployment
//! health continuously observed.
//!
//! ## Overview
//!
//! Tenants pick a server template from a catalog, supply the configuration
//! the template's schema demands (API keys, upstream URLs, tuning knobs), and
//! get back a running server with its own public URL. The platform operator
//! onboards new server types by writing a template row; only server types
//! that need checks a schema cannot express get a bespoke adapter.
//!
//! ### Request Flow
//!
//! A create request passes through the [`orchestrator::Orchestrator`]:
//! template resolution and access control, adapter-or-generic configuration
//! validation, unique name reservation (first-fit numeric suffixing backed by
//! a database constraint), and insertion of a `pending` deployment row.
//! Provisioning then drives the [`provider::Provider`] client through project
//! and service creation, variable upsert, domain generation and deploy
//! trigger, advancing the status state machine
//! (`pending -> validating -> building -> deploying -> running`) with one
//! immutable log entry per transition.
//!
//! ### Resilience
//!
//! All provider traffic flows through a circuit breaker
//! ([`provider::CircuitBreaker`]) and a bounded exponential-backoff retry
//! policy ([`provider::RetryPolicy`]). Only idempotent-safe operations are
//! retried; service creation and deploy triggers are issued exactly once per
//! call. The [`health::HealthMonitor`] keeps one probe loop per live
//! deployment and reconciles against storage so replicas converge without
//! coordination.
//!
//! ### Persistence
//!
//! PostgreSQL holds all state. Domain logic depends on the
//! [`db::storage::Storage`] seam rather than the pool directly, so the
//! orchestrator, registry, and monitor are all testable against the
//! in-memory implementation in [`test_utils`].

pub mod adapters;
pub mod audit;
pub mod config;
pub mod db;
pub mod errors;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod telemetry;
pub mod templates;
pub mod test_utils;
pub mod transport;
pub mod types;

/// Embedded database migrations, applied with `migrator().run(&pool)`.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
