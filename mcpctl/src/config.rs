//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. Sources are merged in order, later sources winning:
//!
//! 1. **YAML config file** - base configuration
//! 2. **Environment variables** - variables prefixed with `MCPCTL_`
//! 3. **DATABASE_URL** - special case: overrides `database.url` if set
//!
//! Nested values use double underscores in environment variables, e.g.
//! `MCPCTL_PROVIDER__TOKEN=...` sets `provider.token` and
//! `MCPCTL_HEALTH__CHECK_INTERVAL=30s` sets `health.check_interval`.

use crate::health::HealthPolicy;
use crate::orchestrator::OrchestratorConfig;
use crate::provider::railway::RailwayConfig;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

/// Root configuration loaded from YAML and environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Deprecated top-level override; prefer `database.url` or DATABASE_URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// PostgreSQL connection settings
    pub database: DatabaseConfig,
    /// Deployment provider (Railway) client settings
    pub provider: RailwayConfig,
    /// Health probing thresholds and intervals
    pub health: HealthPolicy,
    /// Deployment orchestration settings
    pub orchestrator: OrchestratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database: DatabaseConfig::default(),
            provider: RailwayConfig::default(),
            health: HealthPolicy::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string for the database
    pub url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/mcpctl".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// SQLx connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `path` with environment overrides, then
    /// validate.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(path).extract()?;

        // DATABASE_URL wins over the file value
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("MCPCTL_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database_url".into()))
    }

    /// Consistency checks that cannot be expressed through serde defaults.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.token.is_empty() {
            anyhow::bail!(
                "provider.token is not configured. Set MCPCTL_PROVIDER__TOKEN or add provider.token to the config file."
            );
        }
        if self.database.pool.max_connections == 0 {
            anyhow::bail!("database.pool.max_connections must be at least 1");
        }
        if self.provider.retry.max_attempts == 0 {
            anyhow::bail!("provider.retry.max_attempts must be at least 1");
        }
        if self.health.check_interval.is_zero() {
            anyhow::bail!("health.check_interval must be positive");
        }
        if self.orchestrator.name_attempts == 0 {
            anyhow::bail!("orchestrator.name_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::time::Duration;

    #[test]
    fn yaml_file_with_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                database:
                  url: postgres://db.internal:5432/mcpctl
                provider:
                  token: file-token
                health:
                  check_interval: 2m
                  degraded_latency_ms: 1500
                "#,
            )?;
            jail.set_env("MCPCTL_PROVIDER__TOKEN", "env-token");
            jail.set_env("MCPCTL_ORCHESTRATOR__NAME_ATTEMPTS", "7");

            let config = Config::load("test.yaml").expect("config should load");

            assert_eq!(config.database.url, "postgres://db.internal:5432/mcpctl");
            // Environment overrides the file value
            assert_eq!(config.provider.token, "env-token");
            assert_eq!(config.health.check_interval, Duration::from_secs(120));
            assert_eq!(config.health.degraded_latency_ms, 1500);
            assert_eq!(config.orchestrator.name_attempts, 7);
            Ok(())
        });
    }

    #[test]
    fn database_url_env_var_wins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                database:
                  url: postgres://from-file:5432/mcpctl
                provider:
                  token: t
                "#,
            )?;
            jail.set_env("DATABASE_URL", "postgres://from-env:5432/mcpctl");

            let config = Config::load("test.yaml").expect("config should load");
            assert_eq!(config.database.url, "postgres://from-env:5432/mcpctl");
            Ok(())
        });
    }

    #[test]
    fn missing_provider_token_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "database:\n  url: postgres://localhost/mcpctl\n")?;

            let err = Config::load("test.yaml").expect_err("token is required");
            assert!(err.to_string().contains("provider.token"));
            Ok(())
        });
    }

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.database.pool.max_connections, 10);
        assert_eq!(config.provider.retry.max_attempts, 3);
        assert_eq!(config.health.check_interval, Duration::from_secs(60));
        assert_eq!(config.orchestrator.name_attempts, 20);
    }
}
