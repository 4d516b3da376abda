use crate::resilience::circuit_breaker::CircuitState;
use serde::Serialize;
use std::time::Duration;

/// Health classification for one downstream service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Service answered its health endpoint promptly
    Healthy,
    /// Service is reachable but impaired (slow, circuit recovering)
    Degraded,
    /// Service is unreachable or failing its health check
    Unhealthy,
}

impl HealthState {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Health check outcome for one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Service identifier (e.g. "audio-intelligence")
    pub service: String,
    pub status: HealthState,
    /// Version string reported by the remote health endpoint
    pub version: Option<String>,
    /// Round-trip latency of the health probe
    pub latency: Duration,
    /// Circuit breaker state at probe time
    pub circuit_state: CircuitState,
    /// Redacted description of the most recent failure, if unhealthy
    pub last_error: Option<String>,
}

impl ServiceHealth {
    /// Health entry for a service whose check could not run at all.
    pub fn unreachable(service: impl Into<String>, circuit_state: CircuitState, error: String) -> Self {
        Self {
            service: service.into(),
            status: HealthState::Unhealthy,
            version: None,
            latency: Duration::ZERO,
            circuit_state,
            last_error: Some(error),
        }
    }
}

/// Cross-service health rollup for platform health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedHealth {
    pub status: HealthState,
    pub services: Vec<ServiceHealth>,
    pub degraded_services: Vec<String>,
    pub unhealthy_services: Vec<String>,
    /// Wall time of the whole concurrent check
    pub check_duration: Duration,
}

impl AggregatedHealth {
    /// Roll individual service results up to a platform verdict: two or more
    /// unhealthy services mean the platform is unhealthy; any non-healthy
    /// service degrades it; otherwise healthy.
    pub fn from_services(services: Vec<ServiceHealth>, check_duration: Duration) -> Self {
        let degraded_services: Vec<String> = services
            .iter()
            .filter(|s| s.status == HealthState::Degraded)
            .map(|s| s.service.clone())
            .collect();
        let unhealthy_services: Vec<String> = services
            .iter()
            .filter(|s| s.status == HealthState::Unhealthy)
            .map(|s| s.service.clone())
            .collect();

        let status = if unhealthy_services.len() >= 2 {
            HealthState::Unhealthy
        } else if !unhealthy_services.is_empty() || !degraded_services.is_empty() {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        Self {
            status,
            services,
            degraded_services,
            unhealthy_services,
            check_duration,
        }
    }
}
