mod jwks;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, RwLock,
};

use base64::engine::{general_purpose, Engine};
use jsonwebkey as jwk;
use jsonwebtoken as jwt;
use rsa::{
    pkcs1::{EncodeRsaPrivateKey, LineEnding},
    traits::PublicKeyParts,
};
use tracing::info;

use rota_slo::{errors, Clock, Result};
use rota_storage::{KeyRing, SigningKey};

pub use jwks::{JsonWebKeySet, JwksPublisher};

/// 65537, the only exponent a JWK `PublicExponent` can carry.
const PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

#[derive(Debug, Clone)]
pub struct RotationStrategy {
    /// Seconds a superseded key stays usable for verification. Must not be
    /// shorter than the access token lifetime.
    pub overlap: i64,
    pub key_bits: usize,
}

impl Default for RotationStrategy {
    fn default() -> Self {
        Self {
            overlap: 20 * 60,
            key_bits: 2048,
        }
    }
}

/// Owns the RS256 keypairs of the issuer.
///
/// Readers take an `Arc` snapshot of the ring and never wait on key
/// generation. Writers (`rotate`, `evict_expired`) serialize on `writer`
/// and publish a whole new ring, so a reader sees either the state before
/// or after a rotation.
pub struct SigningKeyStore {
    ring: RwLock<Arc<KeyRing>>,
    writer: Mutex<()>,
    sequence: AtomicU64,
    strategy: RotationStrategy,
    clock: Arc<dyn Clock>,
}

impl SigningKeyStore {
    /// Builds the store and performs the initial rotation.
    pub fn new(
        strategy: RotationStrategy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Self::empty(strategy, clock);
        store.rotate()?;
        Ok(store)
    }

    /// A store that has never rotated. Signing fails until `rotate` runs.
    pub fn empty(strategy: RotationStrategy, clock: Arc<dyn Clock>) -> Self {
        Self {
            ring: RwLock::new(Arc::new(KeyRing::default())),
            writer: Mutex::new(()),
            sequence: AtomicU64::new(0),
            strategy,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn strategy(&self) -> &RotationStrategy {
        &self.strategy
    }

    pub fn snapshot(&self) -> Result<Arc<KeyRing>> {
        let ring = self.ring.read().map_err(errors::any)?;
        Ok(Arc::clone(&ring))
    }

    /// Generates a new keypair and makes it current. The previous current
    /// key is kept for `overlap` seconds, then evicted.
    pub fn rotate(&self) -> Result<String> {
        let _writer = self.writer.lock().map_err(errors::any)?;

        let mut next = KeyRing::clone(&*self.snapshot()?);
        if next.is_empty() {
            info!("no signing key yet, creating the first one");
        }
        let key = self.create_key(self.clock.now())?;
        let kid = key.id.clone();

        let now = self.clock.now();
        if let Some(retired) = next.promote(key, now + self.strategy.overlap)
        {
            info!(
                "retired signing key {}, verifiable until {}",
                retired,
                now + self.strategy.overlap
            );
        }
        for evicted in next.evict_expired(now) {
            info!("evicted signing key {}", evicted);
        }
        self.swap(next)?;

        info!("rotated signing key, current key is {}", kid);
        Ok(kid)
    }

    pub fn current_signing_material(
        &self,
    ) -> Result<(jwt::EncodingKey, String)> {
        let ring = self.snapshot()?;
        let key = ring.current().ok_or_else(errors::no_active_key)?;
        Ok((key.encoding_key.clone(), key.id.clone()))
    }

    /// Public material of `kid`, whether current or inside its overlap
    /// window. A key past its expiry is unknown even before eviction.
    pub fn verification_material(
        &self,
        kid: &str,
    ) -> Result<jwt::DecodingKey> {
        let ring = self.snapshot()?;
        match ring.get(kid) {
            Some(key) if !key.is_expired(self.clock.now()) => {
                Ok(key.decoding_key.clone())
            }
            _ => Err(errors::unknown_key(kid)),
        }
    }

    /// Removes retired keys past their expiry and returns their ids.
    pub fn evict_expired(&self) -> Result<Vec<String>> {
        if !self.snapshot()?.has_expired(self.clock.now()) {
            return Ok(Vec::new());
        }
        let _writer = self.writer.lock().map_err(errors::any)?;

        let mut next = KeyRing::clone(&*self.snapshot()?);
        let evicted = next.evict_expired(self.clock.now());
        if !evicted.is_empty() {
            self.swap(next)?;
            info!("evicted signing keys {:?}", evicted);
        }
        Ok(evicted)
    }

    /// Ids accepted by `verification_material` right now.
    pub fn key_ids(&self) -> Result<Vec<String>> {
        let ring = self.snapshot()?;
        Ok(ring
            .live(self.clock.now())
            .into_iter()
            .map(|key| key.id.clone())
            .collect())
    }

    fn swap(&self, next: KeyRing) -> Result<()> {
        let mut ring = self.ring.write().map_err(errors::any)?;
        *ring = Arc::new(next);
        Ok(())
    }

    fn create_key(&self, created_at: i64) -> Result<SigningKey> {
        let mut rng = rand::thread_rng();
        let private_key =
            rsa::RsaPrivateKey::new(&mut rng, self.strategy.key_bits)
                .map_err(errors::any)?;

        let n = private_key.n().to_bytes_be();
        let e = private_key.e().to_bytes_be();
        if e != PUBLIC_EXPONENT {
            return Err(errors::anyhow(anyhow::anyhow!(
                "unsupported public exponent {:?}",
                e
            )));
        }

        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|err| errors::anyhow(anyhow::anyhow!("{}", err)))?;
        let encoding_key = jwt::EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(errors::any)?;
        let decoding_key = jwt::DecodingKey::from_rsa_components(
            &general_purpose::URL_SAFE_NO_PAD.encode(&n),
            &general_purpose::URL_SAFE_NO_PAD.encode(e),
        )
        .map_err(errors::any)?;

        let id = format!(
            "key-{}-{}",
            created_at,
            self.sequence.fetch_add(1, Ordering::SeqCst)
        );

        let mut public_key = jwk::JsonWebKey::new(jwk::Key::RSA {
            public: jwk::RsaPublic {
                e: jwk::PublicExponent,
                n: n.into(),
            },
            private: None,
        });
        public_key
            .set_algorithm(jwk::Algorithm::RS256)
            .map_err(errors::any)?;
        public_key.key_use = Some(jwk::KeyUse::Signing);
        public_key.key_id = Some(id.clone());

        Ok(SigningKey {
            id,
            encoding_key,
            decoding_key,
            public_key,
            created_at,
            expires_at: None,
        })
    }
}

impl std::fmt::Debug for SigningKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyStore")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
