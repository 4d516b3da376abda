//! Care-plan recommender service: pathway suggestions for a patient summary.

use super::{ServiceClient, ServiceId};
use crate::client::resilient::{CallOptions, ResilientClient};
use crate::resilience::{CircuitState, ServiceHealth};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Request for care-plan recommendations
#[derive(Debug, Clone)]
pub struct CarePlanRequest {
    /// De-identified patient summary text
    pub patient_summary: String,
    /// Active condition codes
    pub conditions: Vec<String>,
    /// Active medication names
    pub medications: Vec<String>,
    /// Cap on the number of returned recommendations
    pub max_recommendations: u32,
}

/// One recommended care pathway
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub pathway_id: String,
    pub title: String,
    pub rationale: String,
    pub confidence: f64,
}

/// Recommender response; `degraded` marks a fallback payload
#[derive(Debug, Clone)]
pub struct CarePlanRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub model_version: Option<String>,
    /// Set when a clinician must review before the plan is actionable
    pub requires_manual_review: bool,
    /// Set when this is a degraded fallback, not genuine model output
    pub degraded: bool,
}

impl CarePlanRecommendations {
    /// Degraded payload returned when the recommender is unavailable; empty
    /// and flagged for manual review so it can never be mistaken for a
    /// genuine "no recommendations" answer.
    pub fn degraded_fallback() -> Self {
        Self {
            recommendations: Vec::new(),
            model_version: None,
            requires_manual_review: true,
            degraded: true,
        }
    }
}

// Wire shapes: exact snake_case JSON contract of the service.

#[derive(Debug, Serialize)]
struct RecommendRequestWire {
    patient_summary: String,
    conditions: Vec<String>,
    medications: Vec<String>,
    max_recommendations: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecommendationWire {
    pathway_id: String,
    title: String,
    rationale: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RecommendResponseWire {
    recommendations: Vec<RecommendationWire>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    requires_manual_review: bool,
}

impl From<&CarePlanRequest> for RecommendRequestWire {
    fn from(req: &CarePlanRequest) -> Self {
        Self {
            patient_summary: req.patient_summary.clone(),
            conditions: req.conditions.clone(),
            medications: req.medications.clone(),
            max_recommendations: req.max_recommendations,
        }
    }
}

impl From<RecommendationWire> for Recommendation {
    fn from(wire: RecommendationWire) -> Self {
        Self {
            pathway_id: wire.pathway_id,
            title: wire.title,
            rationale: wire.rationale,
            confidence: wire.confidence,
        }
    }
}

impl From<RecommendResponseWire> for CarePlanRecommendations {
    fn from(wire: RecommendResponseWire) -> Self {
        Self {
            recommendations: wire
                .recommendations
                .into_iter()
                .map(Recommendation::from)
                .collect(),
            model_version: wire.model_version,
            requires_manual_review: wire.requires_manual_review,
            degraded: false,
        }
    }
}

/// Client for the care-plan recommender service
pub struct RecommenderClient {
    inner: Arc<ResilientClient>,
}

impl RecommenderClient {
    pub fn new(inner: Arc<ResilientClient>) -> Self {
        Self { inner }
    }

    /// Request pathway recommendations. Falls back to an empty,
    /// review-required set when the service is unavailable.
    pub async fn recommend(
        &self,
        request: &CarePlanRequest,
        opts: &CallOptions,
    ) -> Result<CarePlanRecommendations> {
        if request.patient_summary.trim().is_empty() {
            return Err(Error::InvalidRequest {
                field: "patient_summary".to_string(),
                reason: "patient summary must not be empty".to_string(),
            });
        }
        if request.max_recommendations == 0 {
            return Err(Error::InvalidRequest {
                field: "max_recommendations".to_string(),
                reason: "must request at least one recommendation".to_string(),
            });
        }

        debug!(
            conditions = request.conditions.len(),
            medications = request.medications.len(),
            "Requesting care-plan recommendations"
        );
        let wire = RecommendRequestWire::from(request);
        let response = self
            .inner
            .post_json::<_, RecommendResponseWire>("/api/v1/recommend", &wire, opts)
            .await
            .map(CarePlanRecommendations::from);
        self.inner
            .or_fallback(response, CarePlanRecommendations::degraded_fallback)
    }
}

#[async_trait]
impl ServiceClient for RecommenderClient {
    fn id(&self) -> ServiceId {
        ServiceId::Recommender
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
