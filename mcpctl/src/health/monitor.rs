//! Background health monitoring daemon.
//!
//! Keeps one probe loop per live deployment and reconciles the loop set
//! against storage on a fixed interval, so deployments picked up or removed
//! by other replicas converge without coordination.

use super::{HealthPolicy, HealthProber};
use crate::adapters::{AdapterRegistry, GenericAdapter, ServerAdapter};
use crate::db::models::deployments::{Deployment, DeploymentUpdateDBRequest};
use crate::db::models::health_checks::HealthStatus;
use crate::db::storage::Storage;
use crate::errors::Result;
use crate::types::{DeploymentId, abbrev_uuid};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

pub struct HealthMonitor<S: Storage> {
    store: Arc<S>,
    prober: Arc<HealthProber>,
    adapters: Arc<AdapterRegistry>,
    policy: HealthPolicy,
    tasks: Arc<RwLock<HashMap<DeploymentId, JoinHandle<()>>>>,
}

// Manual impl: `S` need not be `Clone` behind the `Arc`.
impl<S: Storage> Clone for HealthMonitor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            prober: self.prober.clone(),
            adapters: self.adapters.clone(),
            policy: self.policy.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<S: Storage> HealthMonitor<S> {
    pub fn new(store: Arc<S>, adapters: Arc<AdapterRegistry>, policy: HealthPolicy) -> anyhow::Result<Self> {
        let prober = Arc::new(HealthProber::new(policy.clone())?);
        Ok(Self {
            store,
            prober,
            adapters,
            policy,
            tasks: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Reconciliation daemon: sync the probe loop set against storage on
    /// every tick. Callers spawn this once at startup.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.policy.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(sync_interval = ?self.policy.sync_interval, "Health monitor started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.sync_with_storage().await {
                warn!(error = %e, "Health monitor sync failed");
            }
        }
    }

    /// Start probe loops for live deployments that lack one and stop loops
    /// whose deployment is no longer live.
    pub async fn sync_with_storage(&self) -> Result<()> {
        let active: HashSet<DeploymentId> = self
            .store
            .active_deployments()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();

        let mut tasks = self.tasks.write().await;

        tasks.retain(|id, handle| {
            if active.contains(id) && !handle.is_finished() {
                return true;
            }
            handle.abort();
            debug!(deployment_id = %abbrev_uuid(id), "Stopped health probe loop");
            false
        });

        for id in active {
            if !tasks.contains_key(&id) {
                tasks.insert(id, self.spawn_probe_loop(id));
                debug!(deployment_id = %abbrev_uuid(&id), "Started health probe loop");
            }
        }

        Ok(())
    }

    /// Abort every probe loop; used at shutdown.
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.write().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    pub async fn monitored_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    fn spawn_probe_loop(&self, deployment_id: DeploymentId) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.policy.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let deployment = match monitor.store.get_deployment(deployment_id).await {
                    Ok(Some(d)) if d.status.is_active() => d,
                    Ok(_) => break, // deleted or no longer live; reconciliation reaps the handle
                    Err(e) => {
                        warn!(deployment_id = %abbrev_uuid(&deployment_id), error = %e, "Health loop failed to load deployment");
                        continue;
                    }
                };

                if let Err(e) = monitor.check_deployment(&deployment).await {
                    warn!(deployment_id = %abbrev_uuid(&deployment_id), error = %e, "Health check failed");
                }
            }
        })
    }

    /// Probe one deployment, persist the result, and refresh its
    /// `health_status` from the latest stored check.
    #[instrument(skip(self, deployment), fields(deployment_id = %abbrev_uuid(&deployment.id)))]
    pub async fn check_deployment(&self, deployment: &Deployment) -> Result<HealthStatus> {
        let Some(service_url) = deployment.service_url.as_deref() else {
            // No domain yet; nothing to probe
            return Ok(deployment.health_status);
        };

        let template = self.store.get_template(deployment.server_template_id).await?;
        let health_url = match &template {
            Some(template) => self.adapter_for(&template.name).health_check_url(service_url, template),
            None => super::join_url(service_url, "/health"),
        };

        let check = self.prober.probe(deployment.id, &health_url).await;
        self.store.insert_health_check(check).await?;

        self.refresh_health_status(deployment).await
    }

    /// Derive `health_status` from the most recent stored check (by
    /// `checked_at`, not insert order) and persist it if it changed.
    pub async fn refresh_health_status(&self, deployment: &Deployment) -> Result<HealthStatus> {
        let status = self
            .store
            .latest_health_check(deployment.id)
            .await?
            .map(|check| check.status)
            .unwrap_or(HealthStatus::Unknown);

        if status != deployment.health_status {
            self.store
                .update_deployment(
                    deployment.id,
                    DeploymentUpdateDBRequest {
                        health_status: Some(status),
                        ..Default::default()
                    },
                )
                .await?;
            info!(
                deployment_id = %abbrev_uuid(&deployment.id),
                from = deployment.health_status.to_db_string(),
                to = status.to_db_string(),
                "Deployment health status changed"
            );
        }

        Ok(status)
    }

    fn adapter_for(&self, template_name: &str) -> Box<dyn ServerAdapter> {
        if self.adapters.is_supported(template_name) {
            self.adapters
                .create_adapter(template_name)
                .unwrap_or_else(|_| Box::new(GenericAdapter))
        } else {
            Box::new(GenericAdapter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::deployments::{DeploymentCreateDBRequest, DeploymentStatus};
    use crate::db::models::deployments::AdvancedConfig;
    use crate::db::models::health_checks::HealthCheckCreateDBRequest;
    use crate::test_utils::{MemoryStorage, template_fixture};
    use crate::transport::TransportType;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn monitor(store: Arc<MemoryStorage>) -> HealthMonitor<MemoryStorage> {
        HealthMonitor::new(
            store,
            Arc::new(AdapterRegistry::with_builtin()),
            HealthPolicy {
                check_interval: Duration::from_secs(60),
                request_timeout: Duration::from_millis(500),
                degraded_latency_ms: 2_000,
                sync_interval: Duration::from_secs(30),
            },
        )
        .unwrap()
    }

    async fn seed_running_deployment(store: &MemoryStorage, service_url: Option<&str>) -> Deployment {
        let template_id = store.seed_template(template_fixture("generic-mcp"));
        let deployment = store
            .insert_deployment(DeploymentCreateDBRequest {
                user_id: Uuid::new_v4(),
                deployment_name: "probe-me".to_string(),
                server_template_id: template_id,
                server_config: BTreeMap::new(),
                advanced_config: AdvancedConfig {
                    transport_type: TransportType::Sse,
                },
            })
            .await
            .unwrap();
        store
            .update_deployment(
                deployment.id,
                DeploymentUpdateDBRequest {
                    status: Some(DeploymentStatus::Running),
                    service_url: Some(service_url.map(|s| s.to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn a_check_records_the_probe_and_updates_the_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStorage::new());
        let deployment = seed_running_deployment(&store, Some(&server.uri())).await;
        let monitor = monitor(store.clone());

        let status = monitor.check_deployment(&deployment).await.unwrap();

        assert_eq!(status, HealthStatus::Healthy);
        let stored = store.get_deployment(deployment.id).await.unwrap().unwrap();
        assert_eq!(stored.health_status, HealthStatus::Healthy);
        assert!(store.latest_health_check(deployment.id).await.unwrap().is_some());
    }

    #[test_log::test(tokio::test)]
    async fn a_deployment_without_a_url_is_not_probed() {
        let store = Arc::new(MemoryStorage::new());
        let deployment = seed_running_deployment(&store, None).await;
        let monitor = monitor(store.clone());

        let status = monitor.check_deployment(&deployment).await.unwrap();

        assert_eq!(status, HealthStatus::Unknown);
        assert!(store.latest_health_check(deployment.id).await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn the_latest_check_wins_regardless_of_insert_order() {
        let store = Arc::new(MemoryStorage::new());
        let deployment = seed_running_deployment(&store, Some("https://svc.example.app")).await;
        let monitor = monitor(store.clone());

        let now = Utc::now();
        // Newer healthy check inserted first, older unhealthy one second
        store
            .insert_health_check(HealthCheckCreateDBRequest {
                deployment_id: deployment.id,
                status: HealthStatus::Healthy,
                response_time_ms: Some(30),
                status_code: Some(200),
                error_message: None,
                checked_at: now,
            })
            .await
            .unwrap();
        store
            .insert_health_check(HealthCheckCreateDBRequest {
                deployment_id: deployment.id,
                status: HealthStatus::Unhealthy,
                response_time_ms: None,
                status_code: None,
                error_message: Some("connection refused".to_string()),
                checked_at: now - ChronoDuration::seconds(60),
            })
            .await
            .unwrap();

        let status = monitor.refresh_health_status(&deployment).await.unwrap();

        assert_eq!(status, HealthStatus::Healthy);
        let stored = store.get_deployment(deployment.id).await.unwrap().unwrap();
        assert_eq!(stored.health_status, HealthStatus::Healthy);
    }

    #[test_log::test(tokio::test)]
    async fn sync_starts_and_stops_probe_loops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStorage::new());
        let deployment = seed_running_deployment(&store, Some(&server.uri())).await;
        let monitor = monitor(store.clone());

        monitor.sync_with_storage().await.unwrap();
        assert_eq!(monitor.monitored_count().await, 1);

        // Re-syncing does not duplicate the loop
        monitor.sync_with_storage().await.unwrap();
        assert_eq!(monitor.monitored_count().await, 1);

        // Once the deployment leaves a live status, its loop is reaped
        store
            .update_deployment(
                deployment.id,
                DeploymentUpdateDBRequest {
                    status: Some(DeploymentStatus::Failed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        monitor.sync_with_storage().await.unwrap();
        assert_eq!(monitor.monitored_count().await, 0);

        monitor.stop_all().await;
    }
}
