use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally
    Closed,
    /// Circuit is open - requests are rejected immediately
    Open,
    /// Circuit is half-open - a single trial call is allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl serde::Serialize for CircuitState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit
    pub failure_threshold: u32,
    /// Time to wait before an open circuit admits a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Per-service failure-state machine.
///
/// Owned exclusively by one `ResilientClient`; never shared across services.
/// All runtime state sits behind one lock so concurrent call outcomes cannot
/// under- or over-count consecutive failures.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Gate a call attempt. Returns `CircuitOpen` without any network attempt
    /// while the breaker is open; once the reset timeout has elapsed, exactly
    /// one caller is admitted as the half-open trial.
    pub async fn try_acquire(&self) -> Result<()> {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(
                        service = %self.name,
                        "Circuit breaker transitioning from Open to Half-Open for trial call"
                    );
                    Ok(())
                } else {
                    debug!(
                        service = %self.name,
                        remaining_ms = (self.config.reset_timeout - elapsed).as_millis() as u64,
                        "Circuit breaker open, failing fast"
                    );
                    Err(Error::CircuitOpen {
                        service: self.name.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    // A trial is already probing the service; everyone else
                    // fails fast until its outcome is known.
                    Err(Error::CircuitOpen {
                        service: self.name.clone(),
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call outcome
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitState::Closed => {
                // Only consecutive runs count; success clears the streak.
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
                info!(
                    service = %self.name,
                    "Circuit breaker closed after successful trial call"
                );
            }
            CircuitState::Open => {
                // A success can only come from a call admitted before the
                // circuit opened; it says nothing about current health.
            }
        }
    }

    /// Record a failed call outcome
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        service = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!(
                    service = %self.name,
                    "Trial call failed, circuit breaker reopened"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Record a call outcome that carries no availability verdict (an auth
    /// rejection, an application-level 4xx). If that call held the half-open
    /// trial slot, free it so the next caller can probe; otherwise the
    /// breaker would stay half-open with every call failing fast until an
    /// administrative reset.
    pub async fn release_trial(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            debug!(
                service = %self.name,
                "Trial call ended without an availability verdict, slot released"
            );
        }
    }

    /// Current state; a pure read with no transition side effects.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Consecutive failure count; exposed for diagnostics.
    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.read().await.consecutive_failures
    }

    /// Administrative override: force Closed and clear the failure counter.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        info!(service = %self.name, "Circuit breaker reset to Closed");
    }

    /// Administrative override: force Open (maintenance windows, incident
    /// response).
    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trial_in_flight = false;
        warn!(service = %self.name, "Circuit breaker forced open");
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
