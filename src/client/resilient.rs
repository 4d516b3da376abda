//! Composition of the resilience layers around one downstream service.
//!
//! Per call: local validation (fail fast, no network) → circuit gate →
//! token signing and request/correlation IDs → retry-wrapped HTTP attempt
//! with a per-attempt deadline → circuit feedback → optional degraded
//! fallback, for availability failures only.

use crate::client::auth::ServiceTokenSigner;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthState, RetryConfig, RetryHandler,
    RetryOptions, RetryStatistics, ServiceHealth, TimeoutExt,
};
use crate::{sanitize, Error, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Per-call options: tracing correlation and cancellation
#[derive(Debug, Default, Clone)]
pub struct CallOptions {
    /// Propagated verbatim as `X-Correlation-ID` when present
    pub correlation_id: Option<String>,
    /// Cancels the call at issue time and during inter-retry delays
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Construction-time settings for one service's client
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Service identifier used in auth claims, errors, and logs
    pub service: String,
    pub base_url: Url,
    /// Deadline applied to each individual attempt
    pub request_timeout: Duration,
    /// Deadline for the health probe
    pub health_timeout: Duration,
    /// Largest accepted outbound payload after serialization
    pub max_payload_bytes: usize,
    pub retry: RetryConfig,
    pub circuit: CircuitBreakerConfig,
}

/// Wire shape of the shared `GET /health` contract
#[derive(Debug, Deserialize)]
struct HealthWire {
    status: String,
    #[serde(default)]
    version: Option<String>,
}

/// Latency above which a responsive service is still reported degraded
const DEGRADED_LATENCY: Duration = Duration::from_secs(2);

/// Retry- and circuit-protected HTTP client for a single downstream service.
///
/// Owns its circuit breaker and retry statistics exclusively; instances are
/// cheap to share behind an `Arc` and safe to call concurrently.
pub struct ResilientClient {
    service: String,
    base_url: Url,
    http: reqwest::Client,
    signer: Arc<ServiceTokenSigner>,
    retry: RetryHandler,
    breaker: CircuitBreaker,
    request_timeout: Duration,
    health_timeout: Duration,
    max_payload_bytes: usize,
    fallbacks_enabled: AtomicBool,
}

impl ResilientClient {
    pub fn new(
        settings: ClientSettings,
        http: reqwest::Client,
        signer: Arc<ServiceTokenSigner>,
    ) -> Self {
        let breaker = CircuitBreaker::new(settings.service.clone(), settings.circuit);
        Self {
            service: settings.service,
            base_url: settings.base_url,
            http,
            signer,
            retry: RetryHandler::new(settings.retry),
            breaker,
            request_timeout: settings.request_timeout,
            health_timeout: settings.health_timeout,
            max_payload_bytes: settings.max_payload_bytes,
            fallbacks_enabled: AtomicBool::new(true),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn fallbacks_enabled(&self) -> bool {
        self.fallbacks_enabled.load(Ordering::Relaxed)
    }

    pub fn set_fallbacks_enabled(&self, enabled: bool) {
        self.fallbacks_enabled.store(enabled, Ordering::Relaxed);
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    pub async fn reset_circuit(&self) {
        self.breaker.reset().await;
    }

    pub async fn force_open_circuit(&self) {
        self.breaker.force_open().await;
    }

    pub fn retry_statistics(&self) -> RetryStatistics {
        self.retry.statistics()
    }

    /// POST a JSON payload and decode a JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B, opts: &CallOptions) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Send,
    {
        let mut payload = serde_json::to_value(body)?;
        sanitize::sanitize_json(&mut payload);
        self.validate_payload(&payload)?;
        self.execute(Method::POST, path, Some(payload), opts).await
    }

    /// GET a JSON response.
    pub async fn get_json<R>(&self, path: &str, opts: &CallOptions) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        self.execute(Method::GET, path, None, opts).await
    }

    /// Replace an availability failure with a degraded fallback value.
    ///
    /// The fallback stands in only for availability failures (timeouts, 5xx,
    /// open circuit) and only while fallbacks are enabled; validation and
    /// auth failures always surface, since a fallback cannot repair a
    /// malformed or unauthorized request.
    pub fn or_fallback<T>(&self, result: Result<T>, fallback: impl FnOnce() -> T) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(error) if self.fallbacks_enabled() && error.is_fallback_eligible() => {
                warn!(
                    service = %self.service,
                    error = %error,
                    "Returning degraded fallback response"
                );
                Ok(fallback())
            }
            Err(error) => Err(error),
        }
    }

    /// POST with a degraded fallback value; see [`Self::or_fallback`].
    pub async fn post_json_or<B, R>(
        &self,
        path: &str,
        body: &B,
        opts: &CallOptions,
        fallback: impl FnOnce() -> R,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Send,
    {
        let result = self.post_json(path, body, opts).await;
        self.or_fallback(result, fallback)
    }

    /// Probe `GET /health` once: no retries, and the probe outcome does not
    /// feed the circuit breaker, so a flapping health endpoint cannot open a
    /// circuit that live traffic is passing through.
    pub async fn check_health(&self) -> ServiceHealth {
        let circuit_state = self.breaker.state().await;
        let started = Instant::now();

        let probe = async {
            let url = self.endpoint("/health")?;
            let token = self.signer.issue(&self.service)?;
            let response = self
                .http
                .get(url)
                .bearer_auth(token)
                .header("X-Request-ID", Uuid::new_v4().to_string())
                .send()
                .await
                .map_err(|e| self.map_transport_error(e))?;

            if !response.status().is_success() {
                return Err(Error::Unavailable {
                    service: self.service.clone(),
                    status: response.status().as_u16(),
                    message: "health endpoint returned non-success".to_string(),
                });
            }
            response.json::<HealthWire>().await.map_err(Error::from)
        }
        .with_deadline(&self.service, self.health_timeout)
        .await;

        let latency = started.elapsed();
        match probe {
            Ok(wire) => {
                let status = match wire.status.as_str() {
                    "ok" | "healthy" => {
                        if latency > DEGRADED_LATENCY {
                            HealthState::Degraded
                        } else {
                            HealthState::Healthy
                        }
                    }
                    "degraded" => HealthState::Degraded,
                    _ => HealthState::Unhealthy,
                };
                ServiceHealth {
                    service: self.service.clone(),
                    status,
                    version: wire.version,
                    latency,
                    circuit_state,
                    last_error: None,
                }
            }
            Err(error) => {
                debug!(service = %self.service, error = %error, "Health probe failed");
                ServiceHealth {
                    service: self.service.clone(),
                    status: HealthState::Unhealthy,
                    version: None,
                    latency,
                    circuit_state,
                    last_error: Some(sanitize::redact_for_log(&error.to_string())),
                }
            }
        }
    }

    async fn execute<R>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        opts: &CallOptions,
    ) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        let url = self.endpoint(path)?;
        // One request ID per logical call, stable across its retries.
        let request_id = Uuid::new_v4().to_string();

        let mut retry_options = RetryOptions::default();
        if let Some(token) = &opts.cancel {
            retry_options = retry_options.with_cancel(token.clone());
        }

        self.retry
            .execute(
                |_ctx| {
                    let method = method.clone();
                    let url = url.clone();
                    let body = body.clone();
                    let request_id = request_id.clone();
                    let correlation_id = opts.correlation_id.clone();
                    async move {
                        self.attempt::<R>(method, url, body, request_id, correlation_id)
                            .await
                    }
                },
                &retry_options,
            )
            .await
    }

    /// One protected attempt: circuit gate, signed request, deadline,
    /// classification, circuit feedback.
    async fn attempt<R>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        request_id: String,
        correlation_id: Option<String>,
    ) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        self.breaker.try_acquire().await?;

        let outcome = self
            .send_once::<R>(method, url, body, request_id, correlation_id)
            .await;

        match &outcome {
            Ok(_) => self.breaker.record_success().await,
            Err(error) if error.should_trip_circuit() => self.breaker.record_failure().await,
            // Validation and auth failures are not evidence of downstream
            // unavailability; they leave the failure streak untouched but
            // must still free a held half-open trial slot.
            Err(_) => self.breaker.release_trial().await,
        }

        outcome
    }

    async fn send_once<R>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        request_id: String,
        correlation_id: Option<String>,
    ) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        let token = self.signer.issue(&self.service)?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("X-Request-ID", &request_id);
        if let Some(correlation) = &correlation_id {
            request = request.header("X-Correlation-ID", correlation);
        }
        if let Some(payload) = &body {
            request = request.json(payload);
        }

        async {
            let response = request.send().await.map_err(|e| self.map_transport_error(e))?;
            self.classify_response::<R>(response).await
        }
        .with_deadline(&self.service, self.request_timeout)
        .await
    }

    async fn classify_response<R>(&self, response: reqwest::Response) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        let status = response.status();
        if status.is_success() {
            return response.json::<R>().await.map_err(Error::from);
        }

        let code = status.as_u16();
        let message = sanitize::redact_for_log(&response.text().await.unwrap_or_default());
        match code {
            401 | 403 => Err(Error::AuthRejected {
                service: self.service.clone(),
                status: code,
            }),
            // Upstream load shedding counts as unavailability, not as an
            // application-level rejection.
            408 | 429 => Err(Error::Unavailable {
                service: self.service.clone(),
                status: code,
                message,
            }),
            400..=499 => Err(Error::UpstreamRejected {
                service: self.service.clone(),
                status: code,
                message,
            }),
            _ => Err(Error::Unavailable {
                service: self.service.clone(),
                status: code,
                message,
            }),
        }
    }

    fn map_transport_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout {
                service: self.service.clone(),
                timeout: self.request_timeout,
            }
        } else if error.is_connect() {
            if is_dns_failure(&error) {
                Error::DnsFailure {
                    hostname: self.base_url.host_str().unwrap_or_default().to_string(),
                }
            } else {
                Error::ConnectionRefused {
                    endpoint: self.base_url.to_string(),
                }
            }
        } else {
            Error::Http(error)
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| Error::InvalidRequest {
            field: "path".to_string(),
            reason: e.to_string(),
        })
    }

    /// Reject empty or oversized payloads locally, before any I/O.
    fn validate_payload(&self, payload: &Value) -> Result<()> {
        let empty = match payload {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Err(Error::InvalidRequest {
                field: "payload".to_string(),
                reason: "request payload is empty".to_string(),
            });
        }

        let size = serde_json::to_vec(payload)?.len();
        if size > self.max_payload_bytes {
            return Err(Error::InvalidRequest {
                field: "payload".to_string(),
                reason: format!(
                    "serialized payload of {size} bytes exceeds the {} byte limit",
                    self.max_payload_bytes
                ),
            });
        }
        Ok(())
    }
}

/// Hyper reports resolver failures as a "dns error" connect error; reqwest
/// exposes no direct predicate for them, so walk the source chain.
fn is_dns_failure(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        if inner.to_string().contains("dns error") {
            return true;
        }
        source = inner.source();
    }
    false
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
