//! Embeddings service: dense vectors for clinical text search.
//!
//! This client deliberately has no degraded fallback. An empty or zeroed
//! vector set fed into similarity search would silently corrupt results;
//! unavailability must surface to the caller instead.

use super::{ServiceClient, ServiceId};
use crate::client::resilient::{CallOptions, ResilientClient};
use crate::resilience::{CircuitState, ServiceHealth};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound on texts per embedding call
pub const MAX_BATCH_SIZE: usize = 256;

/// Request for text embeddings
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    /// Model override; the service default applies when absent
    pub model: Option<String>,
}

/// Embedding vectors, one per input text in order
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
}

// Wire shapes: exact snake_case JSON contract of the service.

#[derive(Debug, Serialize)]
struct EmbedRequestWire {
    texts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponseWire {
    vectors: Vec<Vec<f32>>,
    model: String,
    dimensions: usize,
}

impl From<&EmbeddingRequest> for EmbedRequestWire {
    fn from(req: &EmbeddingRequest) -> Self {
        Self {
            texts: req.texts.clone(),
            model: req.model.clone(),
        }
    }
}

impl From<EmbedResponseWire> for EmbeddingResponse {
    fn from(wire: EmbedResponseWire) -> Self {
        Self {
            vectors: wire.vectors,
            model: wire.model,
            dimensions: wire.dimensions,
        }
    }
}

/// Client for the embeddings service
pub struct EmbeddingsClient {
    inner: Arc<ResilientClient>,
}

impl EmbeddingsClient {
    pub fn new(inner: Arc<ResilientClient>) -> Self {
        Self { inner }
    }

    /// Embed a batch of texts.
    pub async fn embed(
        &self,
        request: &EmbeddingRequest,
        opts: &CallOptions,
    ) -> Result<EmbeddingResponse> {
        if request.texts.is_empty() {
            return Err(Error::InvalidRequest {
                field: "texts".to_string(),
                reason: "at least one text is required".to_string(),
            });
        }
        if request.texts.len() > MAX_BATCH_SIZE {
            return Err(Error::InvalidRequest {
                field: "texts".to_string(),
                reason: format!("batch of {} exceeds the {MAX_BATCH_SIZE} text limit", request.texts.len()),
            });
        }
        if request.texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidRequest {
                field: "texts".to_string(),
                reason: "texts must not be empty".to_string(),
            });
        }

        let wire = EmbedRequestWire::from(request);
        let response: EmbedResponseWire =
            self.inner.post_json("/api/v1/embed", &wire, opts).await?;

        if response.vectors.len() != request.texts.len() {
            return Err(Error::Service(format!(
                "embeddings service returned {} vectors for {} texts",
                response.vectors.len(),
                request.texts.len()
            )));
        }
        Ok(EmbeddingResponse::from(response))
    }
}

#[async_trait]
impl ServiceClient for EmbeddingsClient {
    fn id(&self) -> ServiceId {
        ServiceId::Embeddings
    }

    async fn check_health(&self) -> ServiceHealth {
        self.inner.check_health().await
    }

    async fn circuit_state(&self) -> CircuitState {
        self.inner.circuit_state().await
    }

    async fn reset_circuit(&self) {
        self.inner.reset_circuit().await;
    }

    fn set_fallbacks_enabled(&self, enabled: bool) {
        self.inner.set_fallbacks_enabled(enabled);
    }
}
