//! Schema-driven fallback adapter.
//!
//! New server types need no bespoke adapter: this one validates and
//! transforms purely from the template's env var schemas, which supersedes
//! per-type adapters for onboarding new templates.

use super::{ServerAdapter, ValidationOutcome, inject_runtime_vars, validate_against_schemas};
use crate::db::models::templates::ServerTemplate;
use crate::templates::schema::EnvVarSchema;
use std::collections::BTreeMap;

pub struct GenericAdapter;

#[async_trait::async_trait]
impl ServerAdapter for GenericAdapter {
    fn server_type(&self) -> &str {
        "generic"
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
        validate_against_schemas(config, required, optional)
    }

    fn transform_config(&self, config: &BTreeMap<String, String>, template: &ServerTemplate) -> BTreeMap<String, String> {
        // Tenant fields map 1:1 into provider environment variables
        let mut env = config.clone();
        inject_runtime_vars(&mut env, template);
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::template_fixture;

    #[test]
    fn transform_maps_fields_and_injects_runtime_vars() {
        let template = template_fixture("generic-mcp");
        let config = BTreeMap::from([("api_key".to_string(), "k-1234567890".to_string())]);

        let env = GenericAdapter.transform_config(&config, &template);

        assert_eq!(env.get("api_key").map(String::as_str), Some("k-1234567890"));
        assert_eq!(env.get("PORT").map(String::as_str), Some(&*template.port.to_string()));
        assert_eq!(env.get("HEALTHCHECK_PATH").map(String::as_str), Some("/health"));
        assert_eq!(env.get("NODE_ENV").map(String::as_str), Some("production"));
    }

    #[test]
    fn health_check_url_normalizes_slashes_once() {
        let template = template_fixture("generic-mcp");
        let url = GenericAdapter.health_check_url("https://svc.example.app/", &template);
        assert_eq!(url, "https://svc.example.app/health");
    }
}
