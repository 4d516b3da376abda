//! Behavior tests for the resilient client layer against a mock HTTP server.

use cds_clients::client::resilient::{CallOptions, ClientSettings, ResilientClient};
use cds_clients::client::services::audio::{AudioIntelligenceClient, ExtractionRequest};
use cds_clients::client::services::pdf::{PdfParseRequest, PdfParserClient};
use cds_clients::client::services::recommender::{CarePlanRequest, RecommenderClient};
use cds_clients::client::services::EmbeddingsClient;
use cds_clients::client::ServiceTokenSigner;
use cds_clients::config::AuthSettings;
use cds_clients::{CircuitBreakerConfig, CircuitState, Error, RetryConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

fn client_for(uri: &str, retry: RetryConfig, circuit: CircuitBreakerConfig) -> ResilientClient {
    init_tracing();
    let signer = Arc::new(ServiceTokenSigner::new(&AuthSettings {
        secret: "integration-test-secret".to_string(),
        ..Default::default()
    }));
    ResilientClient::new(
        ClientSettings {
            service: "audio-intelligence".to_string(),
            base_url: Url::parse(uri).unwrap(),
            request_timeout: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            max_payload_bytes: 1 << 20,
            retry,
            circuit,
        },
        reqwest::Client::new(),
        signer,
    )
}

#[tokio::test]
async fn retries_5xx_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(3), CircuitBreakerConfig::default());
    let response: Value = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(response, json!({"ok": true}));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let stats = client.retry_statistics();
    assert_eq!(stats.total_attempts, 3);
    assert_eq!(stats.total_retries, 2);
    assert_eq!(stats.successful_attempts, 1);
}

#[tokio::test]
async fn exhausted_retries_surface_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(3), CircuitBreakerConfig::default());
    let result: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;

    match result.unwrap_err() {
        Error::Unavailable { status, .. } => assert_eq!(status, 502),
        other => panic!("expected Unavailable, got {other}"),
    }
    // 1 initial + 3 retries
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(3), CircuitBreakerConfig::default());
    let result: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;

    assert!(matches!(
        result.unwrap_err(),
        Error::UpstreamRejected { status: 400, .. }
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn auth_rejections_are_terminal_and_skip_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(3), CircuitBreakerConfig::default());
    let result: Result<Value, Error> = client
        .post_json_or(
            "/api/v1/echo",
            &json!({"ping": 1}),
            &CallOptions::default(),
            || json!({"degraded": true}),
        )
        .await;

    // A fallback cannot repair an unauthorized request.
    assert!(matches!(
        result.unwrap_err(),
        Error::AuthRejected { status: 401, .. }
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    // Auth failures are not evidence of unavailability.
    assert_eq!(client.circuit_state().await, CircuitState::Closed);
}

#[tokio::test]
async fn per_attempt_timeout_is_enforced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let signer = Arc::new(ServiceTokenSigner::new(&AuthSettings {
        secret: "integration-test-secret".to_string(),
        ..Default::default()
    }));
    let client = ResilientClient::new(
        ClientSettings {
            service: "audio-intelligence".to_string(),
            base_url: Url::parse(&server.uri()).unwrap(),
            request_timeout: Duration::from_millis(50),
            health_timeout: Duration::from_secs(2),
            max_payload_bytes: 1 << 20,
            retry: fast_retry(0),
            circuit: CircuitBreakerConfig::default(),
        },
        reqwest::Client::new(),
        signer,
    );

    let result: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;
    assert!(matches!(result.unwrap_err(), Error::Timeout { .. }));
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let circuit = CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(60),
    };
    // No retries, so each logical call is exactly one attempt.
    let client = client_for(&server.uri(), fast_retry(0), circuit);

    for _ in 0..2 {
        let result: Result<Value, Error> = client
            .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
            .await;
        assert!(matches!(result.unwrap_err(), Error::Unavailable { .. }));
    }
    assert_eq!(client.circuit_state().await, CircuitState::Open);

    // Fails fast with no network attempt.
    let result: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;
    assert!(matches!(result.unwrap_err(), Error::CircuitOpen { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn half_open_trial_recovers_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let circuit = CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout: Duration::from_millis(50),
    };
    let client = client_for(&server.uri(), fast_retry(0), circuit);

    let _: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;
    assert_eq!(client.circuit_state().await, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // The trial call is admitted and its success closes the circuit.
    let response: Value = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await
        .unwrap();
    assert_eq!(response, json!({"ok": true}));
    assert_eq!(client.circuit_state().await, CircuitState::Closed);
}

#[tokio::test]
async fn auth_rejected_trial_frees_the_half_open_slot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let circuit = CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout: Duration::from_millis(50),
    };
    let client = client_for(&server.uri(), fast_retry(0), circuit);

    let _: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;
    assert_eq!(client.circuit_state().await, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // The trial is answered with 401: terminal for the caller, but not an
    // availability verdict, so it must not keep the trial slot occupied.
    let result: Result<Value, Error> = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await;
    assert!(matches!(result.unwrap_err(), Error::AuthRejected { .. }));

    // The very next call probes again and recovers the circuit on its own,
    // with no administrative reset and no further cooldown.
    let response: Value = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &CallOptions::default())
        .await
        .unwrap();
    assert_eq!(response, json!({"ok": true}));
    assert_eq!(client.circuit_state().await, CircuitState::Closed);
}

#[tokio::test]
async fn open_circuit_returns_fallback_without_network() {
    let server = MockServer::start().await;
    let client = client_for(&server.uri(), fast_retry(0), CircuitBreakerConfig::default());
    client.force_open_circuit().await;

    let response: Value = client
        .post_json_or(
            "/api/v1/echo",
            &json!({"ping": 1}),
            &CallOptions::default(),
            || json!({"degraded": true, "requires_manual_review": true}),
        )
        .await
        .unwrap();

    assert_eq!(response["degraded"], true);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_fallbacks_surface_the_error() {
    let server = MockServer::start().await;
    let client = client_for(&server.uri(), fast_retry(0), CircuitBreakerConfig::default());
    client.force_open_circuit().await;
    client.set_fallbacks_enabled(false);

    let result: Result<Value, Error> = client
        .post_json_or(
            "/api/v1/echo",
            &json!({"ping": 1}),
            &CallOptions::default(),
            || json!({"degraded": true}),
        )
        .await;
    assert!(matches!(result.unwrap_err(), Error::CircuitOpen { .. }));
}

#[tokio::test]
async fn outbound_requests_carry_auth_and_tracing_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .and(header_exists("Authorization"))
        .and(header_exists("X-Request-ID"))
        .and(header("X-Correlation-ID", "corr-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(0), CircuitBreakerConfig::default());
    let opts = CallOptions::default().with_correlation_id("corr-123");
    let response: Value = client
        .post_json("/api/v1/echo", &json!({"ping": 1}), &opts)
        .await
        .unwrap();
    assert_eq!(response, json!({"ok": true}));
}

#[tokio::test]
async fn control_characters_are_stripped_before_transmission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/echo"))
        .and(body_json(json!({"note_text": "chest pain"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), fast_retry(0), CircuitBreakerConfig::default());
    let response: Value = client
        .post_json(
            "/api/v1/echo",
            &json!({"note_text": "chest\u{0000} pain\u{0007}"}),
            &CallOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(response, json!({"ok": true}));
}

#[tokio::test]
async fn audio_extract_maps_wire_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/extract"))
        .and(body_json(json!({"note_text": "pt reports chest pain", "language": "en"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [
                {"label": "chest pain", "category": "symptom", "confidence": 0.94,
                 "span_start": 11, "span_end": 21}
            ],
            "summary": "possible acs",
            "model_version": "2.1.0",
            "requires_manual_review": false
        })))
        .mount(&server)
        .await;

    let client = AudioIntelligenceClient::new(Arc::new(client_for(
        &server.uri(),
        fast_retry(0),
        CircuitBreakerConfig::default(),
    )));
    let result = client
        .extract(
            &ExtractionRequest {
                note_text: "pt reports chest pain".to_string(),
                language: Some("en".to_string()),
                specialty: None,
            },
            &CallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].label, "chest pain");
    assert!(!result.degraded);
}

#[tokio::test]
async fn audio_extract_rejects_empty_note_without_io() {
    let server = MockServer::start().await;
    let client = AudioIntelligenceClient::new(Arc::new(client_for(
        &server.uri(),
        fast_retry(0),
        CircuitBreakerConfig::default(),
    )));

    let result = client
        .extract(
            &ExtractionRequest {
                note_text: "   ".to_string(),
                language: None,
                specialty: None,
            },
            &CallOptions::default(),
        )
        .await;

    assert!(matches!(result.unwrap_err(), Error::InvalidRequest { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn recommender_falls_back_degraded_on_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/recommend"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = RecommenderClient::new(Arc::new(client_for(
        &server.uri(),
        fast_retry(1),
        CircuitBreakerConfig::default(),
    )));
    let result = client
        .recommend(
            &CarePlanRequest {
                patient_summary: "67yo, T2DM".to_string(),
                conditions: vec!["E11.9".to_string()],
                medications: vec![],
                max_recommendations: 5,
            },
            &CallOptions::default(),
        )
        .await
        .unwrap();

    // Self-describing degraded payload, never a silent empty result.
    assert!(result.degraded);
    assert!(result.requires_manual_review);
    assert!(result.recommendations.is_empty());
}

#[tokio::test]
async fn embeddings_outage_surfaces_instead_of_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/embed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = EmbeddingsClient::new(Arc::new(client_for(
        &server.uri(),
        fast_retry(1),
        CircuitBreakerConfig::default(),
    )));
    let result = client
        .embed(
            &cds_clients::client::services::embeddings::EmbeddingRequest {
                texts: vec!["chest pain".to_string()],
                model: None,
            },
            &CallOptions::default(),
        )
        .await;

    assert!(matches!(result.unwrap_err(), Error::Unavailable { .. }));
}

#[tokio::test]
async fn pdf_parse_validates_before_io() {
    let server = MockServer::start().await;
    let client = PdfParserClient::new(Arc::new(client_for(
        &server.uri(),
        fast_retry(0),
        CircuitBreakerConfig::default(),
    )));

    let result = client
        .parse(
            &PdfParseRequest {
                content_base64: String::new(),
                filename: "summary.pdf".to_string(),
            },
            &CallOptions::default(),
        )
        .await;

    assert!(matches!(result.unwrap_err(), Error::InvalidRequest { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}
