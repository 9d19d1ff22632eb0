//! Schema-driven configuration validation.
//!
//! The validator accumulates every violation instead of failing fast so the
//! caller can report all problems in one pass.

use crate::templates::schema::{EnvVarSchema, EnvVarType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Environment variable name the violation applies to
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of validating a tenant configuration against a template schema.
///
/// Returned as a structured value, never an exception; the orchestrator
/// converts a non-empty error list into a single `VALIDATION_FAILED` error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate `config` against the required and optional field schemas.
///
/// Per schema entry: a required field that is absent or empty yields one
/// error and no further checks for that field. A present value runs the type
/// check, then pattern, length, and numeric range checks, accumulating every
/// violation.
pub fn validate_against_schemas(
    config: &BTreeMap<String, String>,
    required: &[EnvVarSchema],
    optional: &[EnvVarSchema],
) -> ValidationOutcome {
    let mut errors = Vec::new();

    for schema in required.iter().chain(optional.iter()) {
        let value = config.get(&schema.name).map(|v| v.trim()).filter(|v| !v.is_empty());

        match value {
            None => {
                if schema.validation.required {
                    errors.push(ValidationError {
                        field: schema.name.clone(),
                        message: format!("{} is required", schema.display_name),
                    });
                }
                // Absent optional fields validate trivially
                continue;
            }
            Some(value) => validate_value(schema, value, &mut errors),
        }
    }

    ValidationOutcome::from_errors(errors)
}

fn validate_value(schema: &EnvVarSchema, value: &str, errors: &mut Vec<ValidationError>) {
    let mut parsed_number = None;

    match schema.var_type {
        EnvVarType::Number => match value.parse::<f64>() {
            Ok(n) => parsed_number = Some(n),
            Err(_) => errors.push(ValidationError {
                field: schema.name.clone(),
                message: format!("{} must be a number", schema.display_name),
            }),
        },
        EnvVarType::Url => {
            if url::Url::parse(value).is_err() {
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} must be a valid URL", schema.display_name),
                });
            }
        }
        EnvVarType::Boolean => {
            if !matches!(value, "true" | "false") {
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} must be true or false", schema.display_name),
                });
            }
        }
        EnvVarType::Enum => {
            if !schema.options.iter().any(|o| o == value) {
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} must be one of: {}", schema.display_name, schema.options.join(", ")),
                });
            }
        }
        EnvVarType::String | EnvVarType::Textarea => {}
    }

    if let Some(pattern) = &schema.validation.pattern {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(value) {
                    errors.push(ValidationError {
                        field: schema.name.clone(),
                        message: format!("{} has an invalid format", schema.display_name),
                    });
                }
            }
            Err(_) => {
                // Template schema bug; surface it rather than silently passing
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} has an invalid validation pattern in its template", schema.display_name),
                });
            }
        }
    }

    let length = value.chars().count();
    if let Some(min_length) = schema.validation.min_length {
        if length < min_length {
            errors.push(ValidationError {
                field: schema.name.clone(),
                message: format!("{} must be at least {} characters", schema.display_name, min_length),
            });
        }
    }
    if let Some(max_length) = schema.validation.max_length {
        if length > max_length {
            errors.push(ValidationError {
                field: schema.name.clone(),
                message: format!("{} must be at most {} characters", schema.display_name, max_length),
            });
        }
    }

    if let Some(n) = parsed_number {
        if let Some(min) = schema.validation.min {
            if n < min {
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} must be at least {}", schema.display_name, min),
                });
            }
        }
        if let Some(max) = schema.validation.max {
            if n > max {
                errors.push(ValidationError {
                    field: schema.name.clone(),
                    message: format!("{} must be at most {}", schema.display_name, max),
                });
            }
        }
    }
}
