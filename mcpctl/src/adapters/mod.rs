//! Server-type adapters: per-type strategies for validating and transforming
//! tenant configuration into a provider-ready deployment.
//!
//! Most server types need no bespoke code: the [`GenericAdapter`] validates
//! purely from the template's env var schemas. A bespoke adapter is only
//! registered when a server type needs checks or transforms the schema cannot
//! express. The [`AdapterRegistry`] is constructed once at process start and
//! passed into the orchestrator by dependency injection so tests can register
//! fakes without touching global state.

pub mod emailbison;
pub mod generic;
pub mod validation;

pub use emailbison::EmailBisonAdapter;
pub use generic::GenericAdapter;
pub use validation::{ValidationError, ValidationOutcome, validate_against_schemas};

use crate::db::models::templates::ServerTemplate;
use crate::errors::Error;
use crate::templates::schema::EnvVarSchema;
use std::collections::{BTreeMap, HashMap};

/// Strategy for one supported server type.
#[async_trait::async_trait]
pub trait ServerAdapter: Send + Sync {
    /// Internal template name this adapter serves, e.g. `emailbison-mcp`.
    fn server_type(&self) -> &str;

    /// Port the server listens on when the template does not override it.
    fn default_port(&self) -> u16;

    /// Validate tenant configuration against the template schemas,
    /// accumulating every violation.
    fn validate_config(
        &self,
        config: &BTreeMap<String, String>,
        required: &[EnvVarSchema],
        optional: &[EnvVarSchema],
    ) -> ValidationOutcome;

    /// Map validated tenant fields into the provider environment variable
    /// collection, including the injected runtime variables.
    fn transform_config(&self, config: &BTreeMap<String, String>, template: &ServerTemplate) -> BTreeMap<String, String>;

    /// Compute the health check URL for a deployed instance.
    fn health_check_url(&self, base_url: &str, template: &ServerTemplate) -> String {
        crate::health::join_url(base_url, &template.healthcheck_path)
    }

    /// Optional live connectivity check against the configured upstream.
    /// The default implementation accepts without probing.
    async fn validate_server_connection(&self, _config: &BTreeMap<String, String>) -> Result<(), String> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn ServerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerAdapter").field("server_type", &self.server_type()).finish()
    }
}

/// Injects the runtime variables every deployment receives on top of the
/// tenant-supplied configuration.
pub(crate) fn inject_runtime_vars(env: &mut BTreeMap<String, String>, template: &ServerTemplate) {
    env.insert("PORT".to_string(), template.port.to_string());
    env.insert("HEALTHCHECK_PATH".to_string(), template.healthcheck_path.clone());
    env.insert("NODE_ENV".to_string(), "production".to_string());
}

type AdapterCtor = fn() -> Box<dyn ServerAdapter>;

/// Name-to-constructor registry deciding adapter-path vs. generic-path.
pub struct AdapterRegistry {
    ctors: HashMap<String, AdapterCtor>,
}

impl AdapterRegistry {
    /// An empty registry; every template falls through to the generic path.
    pub fn new() -> Self {
        Self { ctors: HashMap::new() }
    }

    /// Registry pre-populated with the built-in bespoke adapters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(emailbison::SERVER_TYPE, || Box::new(EmailBisonAdapter));
        registry
    }

    pub fn register(&mut self, name: &str, ctor: AdapterCtor) {
        self.ctors.insert(name.to_string(), ctor);
    }

    /// Pure lookup used to decide adapter-path vs. generic-path.
    pub fn is_supported(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Instantiate the adapter registered under `name`.
    pub fn create_adapter(&self, name: &str) -> Result<Box<dyn ServerAdapter>, Error> {
        self.ctors.get(name).map(|ctor| ctor()).ok_or_else(|| Error::AdapterNotRegistered {
            name: name.to_string(),
        })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_emailbison() {
        let registry = AdapterRegistry::with_builtin();
        assert!(registry.is_supported("emailbison-mcp"));
        assert!(!registry.is_supported("unknown-mcp"));

        let adapter = registry.create_adapter("emailbison-mcp").unwrap();
        assert_eq!(adapter.server_type(), "emailbison-mcp");
    }

    #[test]
    fn unregistered_adapter_yields_descriptive_error() {
        let registry = AdapterRegistry::new();
        let err = registry.create_adapter("mystery-mcp").unwrap_err();
        assert!(err.to_string().contains("mystery-mcp"));
    }

    #[test]
    fn custom_registrations_are_visible() {
        struct FakeAdapter;

        #[async_trait::async_trait]
        impl ServerAdapter for FakeAdapter {
            fn server_type(&self) -> &str {
                "fake-mcp"
            }
            fn default_port(&self) -> u16 {
                9000
            }
            fn validate_config(
                &self,
                _config: &BTreeMap<String, String>,
                _required: &[crate::templates::schema::EnvVarSchema],
                _optional: &[crate::templates::schema::EnvVarSchema],
            ) -> ValidationOutcome {
                ValidationOutcome::ok()
            }
            fn transform_config(
                &self,
                config: &BTreeMap<String, String>,
                _template: &crate::db::models::templates::ServerTemplate,
            ) -> BTreeMap<String, String> {
                config.clone()
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register("fake-mcp", || Box::new(FakeAdapter));
        assert!(registry.is_supported("fake-mcp"));
    }
}
