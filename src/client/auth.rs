//! Service-to-service request signing.
//!
//! Every outbound call carries a short-lived HS256 JWT identifying this
//! platform to the downstream service. Tokens are minted per call; the
//! signing key is derived once at construction.

use crate::config::AuthSettings;
use crate::{Error, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    aud: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Mints bearer tokens for outbound service calls
pub struct ServiceTokenSigner {
    issuer: String,
    audience: String,
    ttl: Duration,
    key: EncodingKey,
}

impl ServiceTokenSigner {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl: settings.token_ttl(),
            key: EncodingKey::from_secret(settings.secret.as_bytes()),
        }
    }

    /// Issue a token scoped to one downstream service.
    pub fn issue(&self, service: &str) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: service.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::from_std(self.ttl).unwrap_or_default()).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| Error::TokenSigning(e.to_string()))
    }
}

impl std::fmt::Debug for ServiceTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTokenSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
