//! Audio intelligence service: clinical entity extraction from encounter
//! notes and dictation transcription.

use super::{ServiceClient, ServiceId};
use crate::client::resilient::{CallOptions, ResilientClient};
use crate::resilience::{CircuitState, ServiceHealth};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Request to extract clinical entities from one encounter note
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub note_text: String,
    /// BCP 47 language tag, defaults to the service's configured locale
    pub language: Option<String>,
    /// Clinical specialty hint (e.g. "cardiology")
    pub specialty: Option<String>,
}

/// One extracted clinical entity
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalEntity {
    pub label: String,
    pub category: String,
    pub confidence: f64,
    pub span_start: usize,
    pub span_end: usize,
}

/// Extraction outcome; `degraded` marks a fallback payload
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub entities: Vec<ClinicalEntity>,
    pub summary: Option<String>,
    pub model_version: Option<String>,
    /// Set when the result must be reviewed by a clinician before use
    pub requires_manual_review: bool,
    /// Set when this is a degraded fallback, not a genuine model output
    pub degraded: bool,
}

impl ExtractionResult {
    /// Degraded payload returned when the service is unavailable. It is
    /// self-describing: callers and the UI can distinguish it from a genuine
    /// empty result.
    pub fn degraded_fallback() -> Self {
        Self {
            entities: Vec::new(),
            summary: None,
            model_version: None,
            requires_manual_review: true,
            degraded: true,
        }
    }
}

/// Transcription job status reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

/// A dictation transcription job
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub job_id: String,
    pub status: TranscriptionStatus,
    pub transcript: Option<String>,
}

// Wire shapes: exact snake_case JSON contract of the service.

#[derive(Debug, Serialize)]
struct ExtractRequestWire {
    note_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    specialty: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExtractBatchRequestWire {
    notes: Vec<ExtractRequestWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntityWire {
    label: String,
    category: String,
    confidence: f64,
    span_start: usize,
    span_end: usize,
}

#[derive(Debug, Deserialize)]
struct ExtractResponseWire {
    entities: Vec<EntityWire>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    requires_manual_review: bool,
}

#[derive(Debug, Deserialize)]
struct ExtractBatchResponseWire {
    results: Vec<ExtractResponseWire>,
}

#[derive(Debug, Serialize)]
struct TranscribeRequestWire {
    audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponseWire {
    job_id: String,
    status: String,
    #[serde(default)]
    transcript: Option<String>,
}

impl From<&ExtractionRequest> for ExtractRequestWire {
    fn from(req: &ExtractionRequest) -> Self {
        Self {
            note_text: req.note_text.clone(),
            language: req.language.clone(),
            specialty: req.specialty.clone(),
        }
    }
}

impl From<EntityWire> for ClinicalEntity {
    fn from(wire: EntityWire) -> Self {
        Self {
            label: wire.label,
            category: wire.category,
            confidence: wire.confidence,
            span_start: wire.span_start,
            span_end: wire.span_end,
        }
    }
}

impl From<ExtractResponseWire> for ExtractionResult {
    fn from(wire: ExtractResponseWire) -> Self {
        Self {
            entities: wire.entities.into_iter().map(ClinicalEntity::from).collect(),
            summary: wire.summary,
            model_version: wire.model_version,
            requires_manual_review: wire.requires_manual_review,
            degraded: false,
        }
    }
}

fn parse_status(status: &str) -> Result<TranscriptionStatus> {
    match status {
        "queued" => Ok(TranscriptionStatus::Queued),
        "processing" => Ok(TranscriptionStatus::Processing),
        "complete" => Ok(TranscriptionStatus::Complete),
        "failed" => Ok(TranscriptionStatus::Failed),
        other => Err(Error::Service(format!(
            "unknown transcription status: {other}"
        ))),
    }
}

impl TryFrom<TranscribeResponseWire> for TranscriptionJob {
    type Error = Error;

    fn try_from(wire: TranscribeResponseWire) -> Result<Self> {
        Ok(Self {
            job_id: wire.job_id,
            status: parse_status(&wire.status)?,
            transcript: wire.transcript,
        })
    }
}

/// Client for the audio intelligence service
pub struct AudioIntelligenceClient {
    inner: Arc<ResilientClient>,
}

impl AudioIntelligenceClient {
    pub fn new(inner: Arc<ResilientClient>) -> Self {
        Self { inner }
    }

    fn validate(request: &ExtractionRequest) -> Result<()> {
        if request.note_text.trim().is_empty() {
            return Err(Error::InvalidRequest {
                field: "note_text".to_string(),
                reason: "note text must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Extract clinical entities from one note. Falls back to a degraded,
    /// review-required result when the service is unavailable.
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
        opts: &CallOptions,
    ) -> Result<ExtractionResult> {
        Self::validate(request)?;
        let wire = ExtractRequestWire::from(request);
        debug!(note_len = request.note_text.len(), "Requesting entity extraction");
        let response = self
            .inner
            .post_json::<_, ExtractResponseWire>("/api/v1/extract", &wire, opts)
            .await
            .map(ExtractionResult::from);
        self.inner
            .or_fallback(response, ExtractionResult::degraded_fallback)
    }

    /// Extract entities for a batch of notes in one round trip.
    pub async fn extract_batch(
        &self,
        requests: &[ExtractionRequest],
        opts: &CallOptions,
    ) -> Result<Vec<ExtractionResult>> {
        if requests.is_empty() {
            return Err(Error::InvalidRequest {
                field: "notes".to_string(),
                reason: "batch must contain at least one note".to_string(),
            });
        }
        for request in requests {
            Self::validate(request)?;
        }

        let wire = ExtractBatchRequestWire {
            notes: requests.iter().map(ExtractRequestWire::from).collect(),
        };
        let response: ExtractBatchResponseWire = self
            .inner
            .post_json("/api/v1/extract/batch", &wire, opts)
            .await?;
        Ok(response
            .results
            .into_iter()
            .map(ExtractionResult::from)
            .collect())
    }

    /// Submit a dictation for transcription.
    pub async fn transcribe(
        &self,
        audio_url: &str,
        language: Option<String>,
        opts: &CallOptions,
    ) -> Result<TranscriptionJob> {
        if audio_url.trim().is_empty() {
            return Err(Error::InvalidRequest {
                field: "audio_url".to_string(),
                reason: "audio URL must not be empty".to_string(),
            });
        }
        let wire = TranscribeRequestWire {
            audio_url: audio_url.to_string(),
            language,
        };
        let response: TranscribeResponseWire = self
            .inner
            .post_json("/api/v1/transcribe", &wire, opts)
            .await?;
        TranscriptionJob::try_from(response)
    }

    /// Poll a transcription job by ID.
    pub async fn transcription(&self, job_id: &str, opts: &CallOptions) -> Result<TranscriptionJob> {
        if job_id.trim().is_empty() {
            return Err(Error::InvalidRequest {
                field: "job_id".to_string(),
                reason: "job ID must not be empty".to_string(),
            });
        }
        let response: TranscribeResponseWire = self
            .inner
            .get_json(&format!("/api/v1/transcribe/{job_id}"), opts)
            .await?;
        TranscriptionJob::try_from(response)
    }
}

#[async_trait]
impl ServiceClient for AudioIntelligenceClient {
    fn id(&self) -> ServiceId {
        ServiceId::AudioIntelligence
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
