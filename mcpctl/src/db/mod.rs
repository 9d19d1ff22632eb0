//! Database layer for data persistence and access.
//!
//! Implements the data access layer using SQLx with PostgreSQL, following
//! the Repository pattern: one repository per table over a `PgConnection`,
//! typed request/response models in [`models`], and categorized errors in
//! [`errors`]. The [`storage::Storage`] trait sits above the repositories as
//! the seam the orchestration core depends on, so tests can run against an
//! in-memory implementation.
//!
//! Repositories work with SQLx transactions; create them from a transaction
//! when multiple operations must commit atomically:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Deployments::new(&mut tx);
//! // ... operations ...
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are exposed via [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
pub mod storage;
