//! PDF parser service: text and section extraction from uploaded documents.

use super::{ServiceClient, ServiceId};
use crate::client::resilient::{CallOptions, ResilientClient};
use crate::resilience::{CircuitState, ServiceHealth};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request to parse one uploaded document
#[derive(Debug, Clone)]
pub struct PdfParseRequest {
    /// Base64-encoded document content
    pub content_base64: String,
    pub filename: String,
}

/// One detected document section
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSection {
    pub heading: String,
    pub body: String,
}

/// Parse outcome; `degraded` marks a fallback payload
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub text: String,
    pub page_count: u32,
    pub sections: Vec<DocumentSection>,
    /// Set when the document must be reviewed by hand before use
    pub requires_manual_review: bool,
    /// Set when this is a degraded fallback, not a genuine parse
    pub degraded: bool,
}

impl ParsedDocument {
    /// Degraded payload returned when the parser is unavailable; flagged so
    /// the caller routes the document to manual processing.
    pub fn degraded_fallback() -> Self {
        Self {
            text: String::new(),
            page_count: 0,
            sections: Vec::new(),
            requires_manual_review: true,
            degraded: true,
        }
    }
}

// Wire shapes: exact snake_case JSON contract of the service.

#[derive(Debug, Serialize)]
struct ParseRequestWire {
    content_base64: String,
    filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SectionWire {
    heading: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponseWire {
    text: String,
    page_count: u32,
    #[serde(default)]
    sections: Vec<SectionWire>,
    #[serde(default)]
    requires_manual_review: bool,
}

impl From<&PdfParseRequest> for ParseRequestWire {
    fn from(req: &PdfParseRequest) -> Self {
        Self {
            content_base64: req.content_base64.clone(),
            filename: req.filename.clone(),
        }
    }
}

impl From<SectionWire> for DocumentSection {
    fn from(wire: SectionWire) -> Self {
        Self {
            heading: wire.heading,
            body: wire.body,
        }
    }
}

impl From<ParseResponseWire> for ParsedDocument {
    fn from(wire: ParseResponseWire) -> Self {
        Self {
            text: wire.text,
            page_count: wire.page_count,
            sections: wire.sections.into_iter().map(DocumentSection::from).collect(),
            requires_manual_review: wire.requires_manual_review,
            degraded: false,
        }
    }
}

/// Client for the PDF parser service
pub struct PdfParserClient {
    inner: Arc<ResilientClient>,
}

impl PdfParserClient {
    pub fn new(inner: Arc<ResilientClient>) -> Self {
        Self { inner }
    }

    /// Parse an uploaded document. Falls back to an empty, review-required
    /// result when the parser is unavailable.
    pub async fn parse(
        &self,
        request: &PdfParseRequest,
        opts: &CallOptions,
    ) -> Result<ParsedDocument> {
        if request.content_base64.is_empty() {
            return Err(Error::InvalidRequest {
                field: "content_base64".to_string(),
                reason: "document content must not be empty".to_string(),
            });
        }
        if request.filename.trim().is_empty() {
            return Err(Error::InvalidRequest {
                field: "filename".to_string(),
                reason: "filename must not be empty".to_string(),
            });
        }

        let wire = ParseRequestWire::from(request);
        let response = self
            .inner
            .post_json::<_, ParseResponseWire>("/api/v1/parse", &wire, opts)
            .await
            .map(ParsedDocument::from);
        self.inner
            .or_fallback(response, ParsedDocument::degraded_fallback)
    }
}

#[async_trait]
impl ServiceClient for PdfParserClient {
    fn id(&self) -> ServiceId {
        ServiceId::PdfParser
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_mapping() {
        let request = PdfParseRequest {
            content_base64: "JVBERi0xLjQ=".to_string(),
            filename: "discharge-summary.pdf".to_string(),
        };
        let value = serde_json::to_value(ParseRequestWire::from(&request)).unwrap();
        assert_eq!(
            value,
            json!({"content_base64": "JVBERi0xLjQ=", "filename": "discharge-summary.pdf"})
        );
    }

    #[test]
    fn test_response_wire_mapping() {
        let wire: ParseResponseWire = serde_json::from_value(json!({
            "text": "DISCHARGE SUMMARY ...",
            "page_count": 3,
            "sections": [{"heading": "Medications", "body": "metformin 500mg"}],
            "requires_manual_review": false
        }))
        .unwrap();
        let parsed = ParsedDocument::from(wire);
        assert_eq!(parsed.page_count, 3);
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].heading, "Medications");
        assert!(!parsed.degraded);
    }

    #[test]
    fn test_degraded_fallback_is_flagged() {
        let fallback = ParsedDocument::degraded_fallback();
        assert!(fallback.degraded);
        assert!(fallback.requires_manual_review);
        assert_eq!(fallback.page_count, 0);
    }
}
