//! Configuration for the client factory.
//!
//! Settings are resolved once at factory construction from three layers:
//! built-in defaults, an optional TOML file, and `CDS_`-prefixed environment
//! variables (e.g. `CDS_AUTH__SECRET`, `CDS_SERVICES__RECOMMENDER__BASE_URL`).
//! The resolved `Config` is immutable for the life of the factory.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Service-to-service credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// JWT issuer claim, identifies this platform
    pub issuer: String,
    /// JWT audience claim, identifies the ML service mesh
    pub audience: String,
    /// HS256 signing secret shared with downstream services
    pub secret: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: "cds-platform".to_string(),
            audience: "cds-ml-services".to_string(),
            secret: String::new(),
            token_ttl_secs: 300,
        }
    }
}

impl AuthSettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

/// Per-service endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the service, e.g. `http://audio-intelligence:8081`
    pub base_url: String,
}

impl ServiceSettings {
    fn localhost(port: u16) -> Self {
        Self {
            base_url: format!("http://localhost:{port}"),
        }
    }
}

/// Endpoints for every downstream ML service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub audio_intelligence: ServiceSettings,
    pub recommender: ServiceSettings,
    pub embeddings: ServiceSettings,
    pub pdf_parser: ServiceSettings,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            audio_intelligence: ServiceSettings::localhost(8081),
            recommender: ServiceSettings::localhost(8082),
            embeddings: ServiceSettings::localhost(8083),
            pdf_parser: ServiceSettings::localhost(8084),
        }
    }
}

/// Retry policy settings, converted to `RetryConfig` at client construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> crate::resilience::RetryConfig {
        crate::resilience::RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            ..Default::default()
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
        }
    }
}

impl CircuitSettings {
    pub fn to_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

/// Top-level configuration supplied once at factory construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthSettings,
    pub services: ServiceEndpoints,
    pub retry: RetrySettings,
    pub circuit: CircuitSettings,
    /// Per-attempt request deadline in seconds
    pub request_timeout_secs: u64,
    /// Deadline for a single health probe in seconds
    pub health_check_timeout_secs: u64,
    /// Largest accepted outbound payload in bytes
    pub max_payload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: AuthSettings::default(),
            services: ServiceEndpoints::default(),
            retry: RetrySettings::default(),
            circuit: CircuitSettings::default(),
            request_timeout_secs: 30,
            health_check_timeout_secs: 5,
            max_payload_bytes: 1_048_576, // 1 MiB
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and environment
    /// overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CDS")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    /// Validate cross-field constraints before any client is built.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            return Err(Error::InvalidRequest {
                field: "auth.secret".to_string(),
                reason: "signing secret must not be empty".to_string(),
            });
        }
        if self.retry.backoff_multiplier <= 1.0 {
            return Err(Error::InvalidRequest {
                field: "retry.backoff_multiplier".to_string(),
                reason: "must be greater than 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(Error::InvalidRequest {
                field: "retry.jitter_factor".to_string(),
                reason: "must be within 0..=1".to_string(),
            });
        }
        if self.circuit.failure_threshold == 0 {
            return Err(Error::InvalidRequest {
                field: "circuit.failure_threshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        for (name, svc) in [
            ("services.audio_intelligence", &self.services.audio_intelligence),
            ("services.recommender", &self.services.recommender),
            ("services.embeddings", &self.services.embeddings),
            ("services.pdf_parser", &self.services.pdf_parser),
        ] {
            url::Url::parse(&svc.base_url).map_err(|e| Error::InvalidRequest {
                field: format!("{name}.base_url"),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret() -> Config {
        Config {
            auth: AuthSettings {
                secret: "test-secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_cover_all_services() {
        let config = Config::default();
        assert_eq!(
            config.services.audio_intelligence.base_url,
            "http://localhost:8081"
        );
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.circuit.reset_timeout_secs, 30);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(with_secret().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_multiplier() {
        let mut config = with_secret();
        config.retry.backoff_multiplier = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_jitter() {
        let mut config = with_secret();
        config.retry.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_url() {
        let mut config = with_secret();
        config.services.embeddings.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conversions() {
        let config = with_secret();
        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(100));

        let breaker = config.circuit.to_breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(30));
    }
}
