use std::sync::Arc;

use base64::engine::{general_purpose, Engine};
use jsonwebkey as jwk;
use jsonwebtoken as jwt;
use serde::{Deserialize, Serialize};

use rota_slo::{errors, Result};

use super::SigningKeyStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<jwk::JsonWebKey>,
}

impl JsonWebKeySet {
    pub fn find(&self, kid: &str) -> Option<&jwk::JsonWebKey> {
        self.keys
            .iter()
            .find(|key| key.key_id.as_deref() == Some(kid))
    }

    pub fn key_ids(&self) -> Vec<String> {
        self.keys.iter().filter_map(|key| key.key_id.clone()).collect()
    }

    /// Verification key for `kid` as a consumer of the published set would
    /// build it.
    pub fn decoding_key(&self, kid: &str) -> Result<jwt::DecodingKey> {
        let key = self.find(kid).ok_or_else(|| errors::unknown_key(kid))?;
        match &*key.key {
            jwk::Key::RSA { public, .. } => {
                jwt::DecodingKey::from_rsa_components(
                    &general_purpose::URL_SAFE_NO_PAD.encode(public.n.to_vec()),
                    "AQAB",
                )
                .map_err(errors::any)
            }
            _ => Err(errors::bad_request("only RSA keys are published")),
        }
    }
}

/// Derives the public key set verifiers consume from the key store.
#[derive(Debug)]
pub struct JwksPublisher {
    keys: Arc<SigningKeyStore>,
}

impl JwksPublisher {
    pub fn new(keys: Arc<SigningKeyStore>) -> Self {
        Self { keys }
    }

    /// One record per key that can still verify a token: the current key
    /// first, then retired keys inside their overlap window.
    pub fn publish(&self) -> Result<JsonWebKeySet> {
        self.keys.evict_expired()?;
        let now = self.keys.now();
        let ring = self.keys.snapshot()?;
        Ok(JsonWebKeySet {
            keys: ring
                .live(now)
                .into_iter()
                .map(|key| key.public_key.clone())
                .collect(),
        })
    }
}
