//! Circuit breaker for downstream dependencies.
//!
//! Prevents cascading failures by tracking consecutive failures and
//! temporarily rejecting calls to an unhealthy dependency. One breaker is
//! constructed per downstream dependency (deployment provider, datastore)
//! and shared across concurrent callers.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Too many failures; requests are rejected without being attempted.
    Open,
    /// Cooldown elapsed; exactly one trial request decides the outcome.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-dependency breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial call is outstanding
    trial_in_flight: bool,
}

/// Shared failure-tracking state for one downstream dependency.
///
/// All transitions happen under one mutex so failure counting does not race
/// under concurrent load.
pub struct CircuitBreaker {
    dependency: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(dependency: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Name of the downstream dependency this breaker guards.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Whether a call may proceed. While open and cooling down every call is
    /// rejected; after the recovery timeout exactly one trial call passes.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(dependency = %self.dependency, "Circuit breaker closing after successful trial call");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        dependency = %self.dependency,
                        failures = inner.failure_count,
                        "Circuit breaker opening after consecutive failures"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(dependency = %self.dependency, "Circuit breaker re-opening after failed trial call");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Administrative reset: force the circuit closed with a zero failure
    /// count regardless of recorded history. Reachable only through an
    /// operator interface.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        info!(dependency = %self.dependency, old_state = %inner.state, "Circuit breaker reset by operator");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    info!(dependency = %self.dependency, "Circuit breaker half-open after recovery timeout");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("railway", test_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_the_failure_count_while_closed() {
        let breaker = CircuitBreaker::new("railway", test_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn allows_exactly_one_trial_call_after_recovery_timeout() {
        let breaker = CircuitBreaker::new("railway", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // The trial call is still outstanding; concurrent callers are rejected
        assert!(!breaker.allow_request());
    }

    #[test]
    fn trial_outcome_decides_closed_or_open() {
        let breaker = CircuitBreaker::new("railway", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow_request());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn reset_always_forces_closed_with_zero_failures() {
        let breaker = CircuitBreaker::new("railway", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.allow_request());
    }
}
