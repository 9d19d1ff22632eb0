//! Bespoke adapter for the EmailBison MCP server.
//!
//! EmailBison predates the schema-driven generic path and keeps its own
//! adapter: it enforces its credential shape even when a template schema
//! omits the rules, and maps tenant fields onto the EMAILBISON_* variable
//! names its image expects.

use super::{ServerAdapter, ValidationError, ValidationOutcome, inject_runtime_vars, validate_against_schemas};
use crate::db::models::templates::ServerTemplate;
use crate::templates::schema::EnvVarSchema;
use std::collections::BTreeMap;

pub const SERVER_TYPE: &str = "emailbison-mcp";

const MIN_API_KEY_LENGTH: usize = 10;

pub struct EmailBisonAdapter;

#[async_trait::async_trait]
impl ServerAdapter for EmailBisonAdapter {
    fn server_type(&self) -> &str {
        SERVER_TYPE
    }

    fn default_port(&self) -> u16 {
        3000
    }

    fn validate_config(
        &self,
        config: &BTreeMap<String, String>,
        required: &[EnvVarSchema],
        optional: &[EnvVarSchema],
    ) -> ValidationOutcome {
        let mut errors = validate_against_schemas(config, required, optional).errors;

        // Credential shape checks independent of the template schema
        match config.get("api_key").map(|v| v.trim()) {
            None | Some("") => {
                if !errors.iter().any(|e| e.field == "api_key") {
                    errors.push(ValidationError {
                        field: "api_key".to_string(),
                        message: "API key is required".to_string(),
                    });
                }
            }
            Some(key) if key.chars().count() < MIN_API_KEY_LENGTH => {
                if !errors.iter().any(|e| e.field == "api_key") {
                    errors.push(ValidationError {
                        field: "api_key".to_string(),
                        message: format!("API key must be at least {} characters", MIN_API_KEY_LENGTH),
                    });
                }
            }
            Some(_) => {}
        }

        match config.get("base_url").map(|v| v.trim()) {
            None | Some("") => {
                if !errors.iter().any(|e| e.field == "base_url") {
                    errors.push(ValidationError {
                        field: "base_url".to_string(),
                        message: "Base URL is required".to_string(),
                    });
                }
            }
            Some(value) => {
                if url::Url::parse(value).is_err() && !errors.iter().any(|e| e.field == "base_url") {
                    errors.push(ValidationError {
                        field: "base_url".to_string(),
                        message: "Base URL must be a valid URL".to_string(),
                    });
                }
            }
        }

        ValidationOutcome::from_errors(errors)
    }

    fn transform_config(&self, config: &BTreeMap<String, String>, template: &ServerTemplate) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        for (key, value) in config {
            match key.as_str() {
                "api_key" => env.insert("EMAILBISON_API_KEY".to_string(), value.clone()),
                "base_url" => env.insert("EMAILBISON_BASE_URL".to_string(), value.trim_end_matches('/').to_string()),
                _ => env.insert(key.clone(), value.clone()),
            };
        }

        inject_runtime_vars(&mut env, template);
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::schema::EnvVarType;
    use crate::test_utils::template_fixture;

    fn schemas() -> (Vec<EnvVarSchema>, Vec<EnvVarSchema>) {
        (
            vec![
                EnvVarSchema::required("api_key", "API key", EnvVarType::String).with_min_length(10),
                EnvVarSchema::required("base_url", "Base URL", EnvVarType::Url),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn rejects_short_key_and_bad_url_together() {
        let (required, optional) = schemas();
        let config = BTreeMap::from([
            ("api_key".to_string(), "short".to_string()),
            ("base_url".to_string(), "not-a-url".to_string()),
        ]);

        let outcome = EmailBisonAdapter.validate_config(&config, &required, &optional);

        assert!(!outcome.valid);
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn accepts_a_plausible_config() {
        let (required, optional) = schemas();
        let config = BTreeMap::from([
            ("api_key".to_string(), "a-valid-looking-key-123".to_string()),
            ("base_url".to_string(), "https://api.example.com".to_string()),
        ]);

        let outcome = EmailBisonAdapter.validate_config(&config, &required, &optional);
        assert!(outcome.valid, "{:?}", outcome.errors);
    }

    #[test]
    fn enforces_credential_shape_without_template_rules() {
        // Template schema forgot the rules; the adapter still enforces them
        let config = BTreeMap::from([
            ("api_key".to_string(), "short".to_string()),
            ("base_url".to_string(), "nope".to_string()),
        ]);

        let outcome = EmailBisonAdapter.validate_config(&config, &[], &[]);

        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.field == "api_key"));
        assert!(outcome.errors.iter().any(|e| e.field == "base_url"));
    }

    #[test]
    fn transform_maps_onto_emailbison_variable_names() {
        let template = template_fixture(SERVER_TYPE);
        let config = BTreeMap::from([
            ("api_key".to_string(), "a-valid-looking-key-123".to_string()),
            ("base_url".to_string(), "https://api.example.com/".to_string()),
        ]);

        let env = EmailBisonAdapter.transform_config(&config, &template);

        assert_eq!(env.get("EMAILBISON_API_KEY").map(String::as_str), Some("a-valid-looking-key-123"));
        assert_eq!(env.get("EMAILBISON_BASE_URL").map(String::as_str), Some("https://api.example.com"));
        assert!(env.contains_key("PORT"));
        assert!(!env.contains_key("api_key"));
    }
}
