//! Broker session credentials and request signing
//!
//! The broker authenticates private endpoints with a bearer token plus an
//! Ed25519 signature over `api_key + unix_timestamp + path + method + body`
//! (body empty for GET). Token acquisition itself (OAuth/MFA) happens out of
//! process; this module only consumes the resulting credentials.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signer, SigningKey};

use crate::config::BrokerConfig;

/// Header set for a signed broker request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// `Authorization: Bearer <token>`
    pub authorization: String,
    /// `x-api-key`
    pub api_key: String,
    /// `x-timestamp` (unix seconds, as sent in the signed message)
    pub timestamp: String,
    /// `x-signature` (base64 Ed25519 signature)
    pub signature: String,
}

/// Holds the bearer token and signing key for one broker session.
pub struct SessionProvider {
    api_key: String,
    bearer_token: String,
    signing_key: SigningKey,
}

impl SessionProvider {
    /// Build a session from broker config. Fails when any credential is
    /// missing or the seed is not a base64 32-byte Ed25519 seed.
    pub fn from_config(broker: &BrokerConfig) -> anyhow::Result<Self> {
        let api_key = broker
            .api_key
            .clone()
            .context("BROKER_API_KEY not configured")?;
        let bearer_token = broker
            .bearer_token
            .clone()
            .context("BROKER_BEARER_TOKEN not configured")?;
        let seed_b64 = broker
            .signing_seed
            .as_ref()
            .context("ED25519_PRIVATE_KEY not configured")?;

        let seed = BASE64
            .decode(seed_b64)
            .context("ED25519_PRIVATE_KEY is not valid base64")?;
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| anyhow::anyhow!("ED25519_PRIVATE_KEY must decode to 32 bytes"))?;

        Ok(Self {
            api_key,
            bearer_token,
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Current bearer token.
    pub fn token(&self) -> &str {
        &self.bearer_token
    }

    /// Sign a request at the current time.
    pub fn sign(&self, path: &str, method: &str, body: &str) -> SignedHeaders {
        self.sign_at(chrono::Utc::now().timestamp(), path, method, body)
    }

    /// Sign with an explicit timestamp (deterministic, used by tests).
    pub fn sign_at(&self, unix_ts: i64, path: &str, method: &str, body: &str) -> SignedHeaders {
        let timestamp = unix_ts.to_string();
        let message = format!("{}{}{}{}{}", self.api_key, timestamp, path, method, body);
        let signature = self.signing_key.sign(message.as_bytes());

        SignedHeaders {
            authorization: format!("Bearer {}", self.bearer_token),
            api_key: self.api_key.clone(),
            timestamp,
            signature: BASE64.encode(signature.to_bytes()),
        }
    }
}
