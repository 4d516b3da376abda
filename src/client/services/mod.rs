//! Typed clients for each downstream ML service.
//!
//! Each client maps a typed domain request onto the service's snake_case
//! wire shape and maps the wire response back, through one owned
//! `ResilientClient`. Wire structs mirror the remote JSON exactly; the
//! conversions are pure and bijective for all passthrough fields.

pub mod audio;
pub mod embeddings;
pub mod pdf;
pub mod recommender;

pub use audio::AudioIntelligenceClient;
pub use embeddings::EmbeddingsClient;
pub use pdf::PdfParserClient;
pub use recommender::RecommenderClient;

use crate::resilience::{CircuitState, ServiceHealth};
use async_trait::async_trait;

/// Identity of every downstream service the platform calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    AudioIntelligence,
    Recommender,
    Embeddings,
    PdfParser,
}

impl ServiceId {
    pub const ALL: [ServiceId; 4] = [
        ServiceId::AudioIntelligence,
        ServiceId::Recommender,
        ServiceId::Embeddings,
        ServiceId::PdfParser,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AudioIntelligence => "audio-intelligence",
            Self::Recommender => "recommender",
            Self::Embeddings => "embeddings",
            Self::PdfParser => "pdf-parser",
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-cutting surface every typed service client exposes to the factory
#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn id(&self) -> ServiceId;

    /// Probe the service's health endpoint; never fails, an unreachable
    /// service yields an unhealthy entry.
    async fn check_health(&self) -> ServiceHealth;

    async fn circuit_state(&self) -> CircuitState;

    async fn reset_circuit(&self);

    fn set_fallbacks_enabled(&self, enabled: bool);
}
