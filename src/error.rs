use std::time::Duration;
use thiserror::Error;

/// Comprehensive error categorization for the resilient client layer
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors (usually permanent)
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Transport errors (potentially transient)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Connection refused: {endpoint}")]
    ConnectionRefused { endpoint: String },

    #[error("DNS resolution failed: {hostname}")]
    DnsFailure { hostname: String },

    // Client errors (permanent - don't retry)
    #[error("Invalid request: {field} - {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("Authentication rejected by {service}: status {status}")]
    AuthRejected { service: String, status: u16 },

    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    #[error("Upstream {service} rejected request: status {status} - {message}")]
    UpstreamRejected {
        service: String,
        status: u16,
        message: String,
    },

    // Server errors (transient - should retry)
    #[error("Service {service} unavailable: status {status} - {message}")]
    Unavailable {
        service: String,
        status: u16,
        message: String,
    },

    // Circuit breaker errors
    #[error("Circuit breaker open for service: {service}")]
    CircuitOpen { service: String },

    // Cancellation
    #[error("Operation aborted by caller")]
    Aborted,

    // General service error
    #[error("Service error: {0}")]
    Service(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Circuit breaker triggered - stop retrying until the breaker recovers
    CircuitBreaker,
    /// Explicit cancellation - never retry
    Aborted,
}

impl Error {
    /// Categorize error for retry logic
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Permanent errors - don't retry
            Error::Config(_)
            | Error::Serde(_)
            | Error::InvalidRequest { .. }
            | Error::AuthRejected { .. }
            | Error::TokenSigning(_)
            | Error::UpstreamRejected { .. }
            | Error::Service(_) => ErrorCategory::Permanent,

            Error::CircuitOpen { .. } => ErrorCategory::CircuitBreaker,

            Error::Aborted => ErrorCategory::Aborted,

            // Transient errors - retry with exponential backoff
            Error::Timeout { .. }
            | Error::ConnectionRefused { .. }
            | Error::DnsFailure { .. }
            | Error::Unavailable { .. } => ErrorCategory::Transient,

            // A decode error means the upstream answered 2xx with a body we
            // cannot parse; repeating the call will not fix the contract.
            Error::Http(e) if e.is_decode() => ErrorCategory::Permanent,
            Error::Http(_) => ErrorCategory::Transient,
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::AuthRejected { status, .. }
            | Error::UpstreamRejected { status, .. }
            | Error::Unavailable { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Stable machine-readable code for transport-level failures
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::Timeout { .. } => Some("timeout"),
            Error::ConnectionRefused { .. } => Some("connection_refused"),
            Error::DnsFailure { .. } => Some("dns_failure"),
            Error::Http(e) if e.is_timeout() => Some("timeout"),
            Error::Http(e) if e.is_connect() => Some("connection_refused"),
            _ => None,
        }
    }

    /// Check if error is retryable by default (status/code sets may narrow this)
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Availability failures count against the circuit breaker; validation and
    /// auth failures do not, since they say nothing about downstream health.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            Error::Timeout { .. }
            | Error::ConnectionRefused { .. }
            | Error::DnsFailure { .. }
            | Error::Unavailable { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// A fallback can only stand in for an availability failure; a malformed
    /// or unauthorized request must still surface to the caller.
    pub fn is_fallback_eligible(&self) -> bool {
        self.should_trip_circuit() || matches!(self, Error::CircuitOpen { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
