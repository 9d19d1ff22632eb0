//! Crate-level error taxonomy.
//!
//! Adapter/validator violations travel as structured results and are folded
//! into a single `ValidationFailed` here; provider and database failures
//! arrive as typed errors. Every variant exposes a machine-readable
//! [`Error::code`] and an HTTP-style [`Error::status_code`] for the boundary
//! layer to map, keeping provider outages (retryable, 502/503-class)
//! distinguishable from tenant configuration mistakes (400-class).

use crate::adapters::ValidationError;
use crate::db::errors::DbError;
use crate::provider::ProviderError;
use http::StatusCode;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Referenced template does not exist
    #[error("Server template {id} not found")]
    TemplateNotFound { id: String },

    /// Caller is not on the template's allow-list
    #[error("Access to template {id} denied")]
    TemplateAccessDenied { id: String },

    /// Tenant configuration failed schema validation; carries every violation
    #[error("Configuration validation failed with {} error(s)", errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    /// No adapter registered under the requested server type
    #[error("No adapter registered for server type '{name}'")]
    AdapterNotRegistered { name: String },

    /// Could not reserve a unique deployment name within the attempt budget
    #[error("Could not find a free name for '{requested}' after {attempts} attempts")]
    NameExhausted { requested: String, attempts: u32 },

    /// Illegal deployment status transition
    #[error("Cannot transition deployment from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Deployment provider failure (already classified by the retry wrapper)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Machine-readable error code for API consumers and log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            Error::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
            Error::TemplateAccessDenied { .. } => "TEMPLATE_ACCESS_DENIED",
            Error::ValidationFailed { .. } => "VALIDATION_FAILED",
            Error::AdapterNotRegistered { .. } => "ADAPTER_NOT_REGISTERED",
            Error::NameExhausted { .. } => "NAME_EXHAUSTED",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Provider(provider_err) => match provider_err {
                ProviderError::CircuitOpen { .. } => "CIRCUIT_BREAKER_OPEN",
                ProviderError::RetryExhausted { .. } => "RETRY_EXHAUSTED",
                ProviderError::Timeout { .. } => "PROVIDER_TIMEOUT",
                _ => "PROVIDER_ERROR",
            },
            Error::Database(_) => "DATABASE_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-style status for the (excluded) boundary layer to map.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::TemplateNotFound { .. } | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::TemplateAccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            Error::AdapterNotRegistered { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NameExhausted { .. } => StatusCode::CONFLICT,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Provider(provider_err) => match provider_err {
                // Outages are "temporarily unavailable", not tenant mistakes
                ProviderError::CircuitOpen { .. } | ProviderError::RetryExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ProviderError::Api { status, .. } if status.is_client_error() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_GATEWAY,
            },
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::ValidationFailed { errors } => {
                let details: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
                format!("Configuration validation failed: {}", details.join("; "))
            }
            Error::Provider(provider_err) => match provider_err {
                ProviderError::CircuitOpen { .. } | ProviderError::RetryExhausted { .. } => {
                    "Deployment provider is temporarily unavailable, please retry later".to_string()
                }
                _ => "Deployment provider request failed".to_string(),
            },
            Error::Database(_) | Error::Other(_) => "Internal service error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_enumerates_every_violation() {
        let err = Error::ValidationFailed {
            errors: vec![
                ValidationError {
                    field: "api_key".to_string(),
                    message: "API key must be at least 10 characters".to_string(),
                },
                ValidationError {
                    field: "base_url".to_string(),
                    message: "Base URL must be a valid URL".to_string(),
                },
            ],
        };

        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let message = err.user_message();
        assert!(message.contains("API key"));
        assert!(message.contains("Base URL"));
    }

    #[test]
    fn provider_outages_are_distinguishable_from_tenant_errors() {
        let outage = Error::Provider(ProviderError::CircuitOpen {
            dependency: "railway".to_string(),
        });
        assert_eq!(outage.code(), "CIRCUIT_BREAKER_OPEN");
        assert_eq!(outage.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(outage.user_message().contains("temporarily unavailable"));

        let tenant = Error::ValidationFailed { errors: Vec::new() };
        assert!(tenant.status_code().is_client_error());
    }
}
