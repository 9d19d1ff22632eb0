//! Health checking for running deployments.
//!
//! The [`prober::HealthProber`] performs individual HTTP checks; the
//! [`monitor::HealthMonitor`] is the background daemon that keeps one probe
//! loop per running deployment and reconciles against storage.

pub mod monitor;
pub mod prober;

pub use monitor::HealthMonitor;
pub use prober::HealthProber;

use crate::db::models::health_checks::HealthStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Join a service base URL and a healthcheck path with exactly one slash
/// between them, regardless of how either side is written.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Thresholds for probing and classifying deployment health.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// How often each running deployment is probed
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Per-probe request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// 2xx responses slower than this are degraded rather than healthy
    pub degraded_latency_ms: u64,
    /// How often the monitor reconciles its probe loops against storage
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            degraded_latency_ms: 2_000,
            sync_interval: Duration::from_secs(30),
        }
    }
}

impl HealthPolicy {
    /// Classify one probe outcome. Any 2xx means the server answered; slow
    /// answers are degraded. Everything else (non-2xx, transport failure,
    /// timeout) is unhealthy.
    pub fn classify(&self, status_code: Option<u16>, response_time_ms: u64) -> HealthStatus {
        match status_code {
            Some(code) if (200..300).contains(&code) => {
                if response_time_ms > self.degraded_latency_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                }
            }
            _ => HealthStatus::Unhealthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_exactly_one_slash() {
        assert_eq!(join_url("https://svc.example.app", "/health"), "https://svc.example.app/health");
        assert_eq!(join_url("https://svc.example.app/", "/health"), "https://svc.example.app/health");
        assert_eq!(join_url("https://svc.example.app/", "health"), "https://svc.example.app/health");
        assert_eq!(join_url("https://svc.example.app", "health"), "https://svc.example.app/health");
    }

    #[test]
    fn classification_follows_status_and_latency() {
        let policy = HealthPolicy::default();

        assert_eq!(policy.classify(Some(200), 150), HealthStatus::Healthy);
        assert_eq!(policy.classify(Some(204), 1_999), HealthStatus::Healthy);
        assert_eq!(policy.classify(Some(200), 2_001), HealthStatus::Degraded);
        assert_eq!(policy.classify(Some(500), 150), HealthStatus::Unhealthy);
        assert_eq!(policy.classify(Some(404), 150), HealthStatus::Unhealthy);
        // No status code at all: connection refused or timed out
        assert_eq!(policy.classify(None, 10_000), HealthStatus::Unhealthy);
    }
}
