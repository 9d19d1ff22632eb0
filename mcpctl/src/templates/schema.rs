//! Declarative environment variable schemas for server templates.
//!
//! A template describes its configuration surface as a list of
//! [`EnvVarSchema`] entries. The schema is the sole source of truth for
//! validation: the generic validator and every bespoke adapter derive their
//! checks from it.

use serde::{Deserialize, Serialize};

/// The value domain of a single configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvVarType {
    #[default]
    String,
    Number,
    Boolean,
    Url,
    Enum,
    /// Free-form multi-line text; validated like a string
    Textarea,
}

/// Constraint set applied to a field after its type check passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationRules {
    /// Field must be present and non-empty
    pub required: bool,
    /// Regular expression the value must match in full
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Inclusive numeric lower bound (number fields only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive numeric upper bound (number fields only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Schema for one configuration field of a server template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVarSchema {
    /// Environment variable name, e.g. `API_KEY`
    pub name: String,
    /// Human-readable name shown to the tenant, e.g. "API key"
    pub display_name: String,
    #[serde(default)]
    pub var_type: EnvVarType,
    #[serde(default)]
    pub validation: ValidationRules,
    /// Allowed values for `EnvVarType::Enum` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EnvVarSchema {
    /// Shorthand for a required field of the given type.
    pub fn required(name: &str, display_name: &str, var_type: EnvVarType) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            var_type,
            validation: ValidationRules {
                required: true,
                ..Default::default()
            },
            options: Vec::new(),
            description: None,
        }
    }

    /// Shorthand for an optional field of the given type.
    pub fn optional(name: &str, display_name: &str, var_type: EnvVarType) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            var_type,
            validation: ValidationRules::default(),
            options: Vec::new(),
            description: None,
        }
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.validation.min_length = Some(min_length);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.validation.max_length = Some(max_length);
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.validation.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.validation.min = Some(min);
        self.validation.max = Some(max);
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}
