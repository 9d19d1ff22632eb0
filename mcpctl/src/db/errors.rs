use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
        /// The conflicting value that caused the violation (if extractable)
        conflicting_value: Option<String>,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether this error is a unique violation on the deployment name
    /// constraint. The orchestrator uses this as the authoritative tie-breaker
    /// when two concurrent creations race on the same name.
    pub fn is_deployment_name_conflict(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { constraint: Some(c), .. }
            if c == "deployments_user_id_deployment_name_key"
        )
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let constraint = db_err.constraint().map(|s| s.to_string());

                    // Extract the conflicting value only for deployment name conflicts
                    let conflicting_value = if let Some(pg_err) = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                        if let Some(detail_msg) = pg_err.detail() {
                            extract_conflicting_name(detail_msg, constraint.as_deref())
                        } else {
                            None
                        }
                    } else {
                        None
                    };

                    DbError::UniqueViolation {
                        constraint,
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                        conflicting_value,
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the conflicting deployment name from PostgreSQL error detail
/// Only extracts for the deployment name constraint to avoid affecting other flows
fn extract_conflicting_name(detail: &str, constraint: Option<&str>) -> Option<String> {
    if constraint == Some("deployments_user_id_deployment_name_key") {
        // PostgreSQL unique violation details typically look like:
        // "Key (user_id, deployment_name)=(..., my-server) already exists."
        if let Some(start) = detail.find("=(") {
            if let Some(end) = detail[start + 2..].find(')') {
                let values = &detail[start + 2..start + 2 + end];
                return values.rsplit(',').next().map(|v| v.trim().to_string());
            }
        }
    }
    None
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_from_composite_key_detail() {
        let detail = "Key (user_id, deployment_name)=(550e8400-e29b-41d4-a716-446655440000, my-server) already exists.";
        let name = extract_conflicting_name(detail, Some("deployments_user_id_deployment_name_key"));
        assert_eq!(name.as_deref(), Some("my-server"));
    }

    #[test]
    fn ignores_other_constraints() {
        let detail = "Key (name)=(emailbison-mcp) already exists.";
        assert_eq!(extract_conflicting_name(detail, Some("server_templates_name_key")), None);
    }
}
