//! Factory owning one resilient client per downstream service.
//!
//! Clients are lazy singletons: created on first use, reused for the life of
//! the factory. The factory is an explicit instance handed to callers by
//! dependency injection; configuration is supplied once at construction and
//! immutable afterwards.

use crate::client::auth::ServiceTokenSigner;
use crate::client::resilient::{ClientSettings, ResilientClient};
use crate::client::services::{
    AudioIntelligenceClient, EmbeddingsClient, PdfParserClient, RecommenderClient, ServiceClient,
    ServiceId,
};
use crate::config::Config;
use crate::resilience::{AggregatedHealth, CircuitState, ServiceHealth};
use crate::{sanitize, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

/// Owns the per-service clients and the cross-cutting operations on them
pub struct ClientFactory {
    config: Arc<Config>,
    http: reqwest::Client,
    signer: Arc<ServiceTokenSigner>,
    audio: OnceCell<Arc<AudioIntelligenceClient>>,
    recommender: OnceCell<Arc<RecommenderClient>>,
    embeddings: OnceCell<Arc<EmbeddingsClient>>,
    pdf: OnceCell<Arc<PdfParserClient>>,
}

impl ClientFactory {
    /// Build a factory from validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("cds-clients/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;
        let signer = Arc::new(ServiceTokenSigner::new(&config.auth));

        Ok(Self {
            config: Arc::new(config),
            http,
            signer,
            audio: OnceCell::new(),
            recommender: OnceCell::new(),
            embeddings: OnceCell::new(),
            pdf: OnceCell::new(),
        })
    }

    fn build_core(&self, id: ServiceId) -> Result<Arc<ResilientClient>> {
        let endpoint = match id {
            ServiceId::AudioIntelligence => &self.config.services.audio_intelligence,
            ServiceId::Recommender => &self.config.services.recommender,
            ServiceId::Embeddings => &self.config.services.embeddings,
            ServiceId::PdfParser => &self.config.services.pdf_parser,
        };
        let base_url = Url::parse(&endpoint.base_url).map_err(|e| Error::InvalidRequest {
            field: format!("services.{id}.base_url"),
            reason: e.to_string(),
        })?;

        info!(service = %id, base_url = %base_url, "Creating resilient client");
        Ok(Arc::new(ResilientClient::new(
            ClientSettings {
                service: id.as_str().to_string(),
                base_url,
                request_timeout: self.config.request_timeout(),
                health_timeout: self.config.health_check_timeout(),
                max_payload_bytes: self.config.max_payload_bytes,
                retry: self.config.retry.to_retry_config(),
                circuit: self.config.circuit.to_breaker_config(),
            },
            self.http.clone(),
            self.signer.clone(),
        )))
    }

    /// Audio intelligence client, created on first use.
    pub async fn audio_intelligence(&self) -> Result<Arc<AudioIntelligenceClient>> {
        self.audio
            .get_or_try_init(|| async {
                Ok(Arc::new(AudioIntelligenceClient::new(
                    self.build_core(ServiceId::AudioIntelligence)?,
                )))
            })
            .await
            .cloned()
    }

    /// Care-plan recommender client, created on first use.
    pub async fn recommender(&self) -> Result<Arc<RecommenderClient>> {
        self.recommender
            .get_or_try_init(|| async {
                Ok(Arc::new(RecommenderClient::new(
                    self.build_core(ServiceId::Recommender)?,
                )))
            })
            .await
            .cloned()
    }

    /// Embeddings client, created on first use.
    pub async fn embeddings(&self) -> Result<Arc<EmbeddingsClient>> {
        self.embeddings
            .get_or_try_init(|| async {
                Ok(Arc::new(EmbeddingsClient::new(
                    self.build_core(ServiceId::Embeddings)?,
                )))
            })
            .await
            .cloned()
    }

    /// PDF parser client, created on first use.
    pub async fn pdf_parser(&self) -> Result<Arc<PdfParserClient>> {
        self.pdf
            .get_or_try_init(|| async {
                Ok(Arc::new(PdfParserClient::new(
                    self.build_core(ServiceId::PdfParser)?,
                )))
            })
            .await
            .cloned()
    }

    fn instantiated(&self) -> Vec<Arc<dyn ServiceClient>> {
        let mut clients: Vec<Arc<dyn ServiceClient>> = Vec::new();
        if let Some(client) = self.audio.get() {
            clients.push(client.clone());
        }
        if let Some(client) = self.recommender.get() {
            clients.push(client.clone());
        }
        if let Some(client) = self.embeddings.get() {
            clients.push(client.clone());
        }
        if let Some(client) = self.pdf.get() {
            clients.push(client.clone());
        }
        clients
    }

    async fn client_for(&self, id: ServiceId) -> Result<Arc<dyn ServiceClient>> {
        let client: Arc<dyn ServiceClient> = match id {
            ServiceId::AudioIntelligence => self.audio_intelligence().await?,
            ServiceId::Recommender => self.recommender().await?,
            ServiceId::Embeddings => self.embeddings().await?,
            ServiceId::PdfParser => self.pdf_parser().await?,
        };
        Ok(client)
    }

    /// Health of one service; construction or probe failures become an
    /// unhealthy entry rather than an error, so one broken service can never
    /// hide the health of the others.
    async fn service_health(&self, id: ServiceId) -> ServiceHealth {
        match self.client_for(id).await {
            Ok(client) => client.check_health().await,
            Err(error) => ServiceHealth::unreachable(
                id.as_str(),
                CircuitState::Closed,
                sanitize::redact_for_log(&error.to_string()),
            ),
        }
    }

    /// Check every service concurrently and aggregate into a platform
    /// verdict. Always returns one entry per known service and never fails.
    pub async fn check_all_services(&self) -> AggregatedHealth {
        let started = Instant::now();
        debug!("Running platform health check across all services");

        let (audio, recommender, embeddings, pdf) = tokio::join!(
            self.service_health(ServiceId::AudioIntelligence),
            self.service_health(ServiceId::Recommender),
            self.service_health(ServiceId::Embeddings),
            self.service_health(ServiceId::PdfParser),
        );

        let aggregated = AggregatedHealth::from_services(
            vec![audio, recommender, embeddings, pdf],
            started.elapsed(),
        );
        info!(
            status = ?aggregated.status,
            unhealthy = aggregated.unhealthy_services.len(),
            degraded = aggregated.degraded_services.len(),
            duration_ms = aggregated.check_duration.as_millis() as u64,
            "Platform health check complete"
        );
        aggregated
    }

    /// Snapshot of every service's circuit state; services never
    /// instantiated report Closed.
    pub async fn circuit_states(&self) -> HashMap<ServiceId, CircuitState> {
        let mut states = HashMap::new();
        for id in ServiceId::ALL {
            states.insert(id, CircuitState::Closed);
        }
        for client in self.instantiated() {
            states.insert(client.id(), client.circuit_state().await);
        }
        states
    }

    /// Force every instantiated client's circuit closed; a no-op for
    /// services not yet created.
    pub async fn reset_all_circuits(&self) {
        for client in self.instantiated() {
            client.reset_circuit().await;
        }
        info!("All circuit breakers reset");
    }

    /// Toggle degraded fallbacks on every instantiated client; a no-op for
    /// services not yet created.
    pub fn set_fallbacks_enabled(&self, enabled: bool) {
        for client in self.instantiated() {
            client.set_fallbacks_enabled(enabled);
        }
        info!(enabled, "Fallbacks toggled across instantiated clients");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("instantiated", &self.instantiated().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSettings;

    fn test_config() -> Config {
        Config {
            auth: AuthSettings {
                secret: "factory-test-secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clients_are_lazy_singletons() {
        let factory = ClientFactory::new(test_config()).unwrap();
        assert!(factory.instantiated().is_empty());

        let first = factory.recommender().await.unwrap();
        let second = factory.recommender().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.instantiated().len(), 1);
    }

    #[tokio::test]
    async fn test_circuit_states_default_closed() {
        let factory = ClientFactory::new(test_config()).unwrap();
        let states = factory.circuit_states().await;
        assert_eq!(states.len(), 4);
        assert!(states.values().all(|s| *s == CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_bulk_operations_are_safe_with_no_clients() {
        let factory = ClientFactory::new(test_config()).unwrap();
        // No clients exist yet; these must be no-ops rather than errors.
        factory.reset_all_circuits().await;
        factory.set_fallbacks_enabled(false);
        assert!(factory.instantiated().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.auth.secret = String::new();
        assert!(ClientFactory::new(config).is_err());
    }
}
