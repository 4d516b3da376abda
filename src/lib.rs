//! Resilient service clients for the clinical decision support platform.
//!
//! Every backend call to an out-of-process ML service (audio intelligence,
//! care-plan recommender, embeddings, PDF parsing) goes through this crate:
//! retry with exponential backoff and jitter, a per-service circuit breaker,
//! degraded-mode fallbacks, service-to-service auth, and cross-service
//! health aggregation.

pub mod client;
pub mod config;
pub mod error;
pub mod resilience;
pub mod sanitize;

pub use client::{
    AudioIntelligenceClient, CallOptions, ClientFactory, EmbeddingsClient, PdfParserClient,
    RecommenderClient, ResilientClient, ServiceClient, ServiceId, ServiceTokenSigner,
};
pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use resilience::{
    AggregatedHealth, CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthState,
    RetryConfig, RetryHandler, RetryOptions, RetryStatistics, ServiceHealth,
};
