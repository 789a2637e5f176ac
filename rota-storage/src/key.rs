use std::{cmp::Reverse, collections::BTreeMap, fmt};

use jsonwebkey as jwk;
use jsonwebtoken as jwt;

/// One RS256 keypair known to the issuer.
///
/// `expires_at` is `None` while the key is the one new tokens are signed
/// with. Once superseded it carries the instant after which tokens signed
/// by it can no longer be verified.
#[derive(Clone)]
pub struct SigningKey {
    pub id: String,
    pub encoding_key: jwt::EncodingKey,
    pub decoding_key: jwt::DecodingKey,
    pub public_key: jwk::JsonWebKey,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl SigningKey {
    pub fn is_current(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Every key the issuer currently knows about plus a pointer to the
/// current one. At most one key has no expiry, and it is always the one
/// `current` points at.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    current: Option<String>,
    keys: BTreeMap<String, SigningKey>,
}

impl KeyRing {
    pub fn current(&self) -> Option<&SigningKey> {
        self.current.as_ref().and_then(|kid| self.keys.get(kid))
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Makes `key` the current key. The previous current key, if any, is
    /// retired with `expires_at = retire_at` and its id returned.
    pub fn promote(
        &mut self,
        mut key: SigningKey,
        retire_at: i64,
    ) -> Option<String> {
        key.expires_at = None;
        let retired = self.current.take().and_then(|kid| {
            self.keys.get_mut(&kid).map(|previous| {
                previous.expires_at = Some(retire_at);
                kid
            })
        });
        self.current = Some(key.id.clone());
        self.keys.insert(key.id.clone(), key);
        retired
    }

    /// Drops every retired key whose expiry is in the past and returns
    /// their ids. The current key is never evicted.
    pub fn evict_expired(&mut self, now: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .keys
            .values()
            .filter(|key| key.is_expired(now))
            .map(|key| key.id.clone())
            .collect();
        for kid in &expired {
            self.keys.remove(kid);
        }
        expired
    }

    pub fn has_expired(&self, now: i64) -> bool {
        self.keys.values().any(|key| key.is_expired(now))
    }

    /// Keys usable for verification at `now`: the current key first, then
    /// retired keys newest first.
    pub fn live(&self, now: i64) -> Vec<&SigningKey> {
        let mut keys: Vec<&SigningKey> = self
            .keys
            .values()
            .filter(|key| !key.is_expired(now))
            .collect();
        keys.sort_by_key(|key| {
            (!key.is_current(), Reverse(key.created_at), key.id.clone())
        });
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, created_at: i64) -> SigningKey {
        SigningKey {
            id: id.to_owned(),
            encoding_key: jwt::EncodingKey::from_secret(b"secret"),
            decoding_key: jwt::DecodingKey::from_secret(b"secret"),
            public_key: jwk::JsonWebKey::new(jwk::Key::generate_p256()),
            created_at,
            expires_at: None,
        }
    }

    #[test]
    fn promote_retires_previous() {
        let mut ring = KeyRing::default();
        assert!(ring.current().is_none());
        assert_eq!(ring.promote(key("k1", 0), 10), None);
        assert_eq!(ring.promote(key("k2", 5), 15), Some("k1".to_owned()));

        assert_eq!(ring.current().unwrap().id, "k2");
        assert_eq!(ring.get("k1").unwrap().expires_at, Some(15));
        assert_eq!(
            ring.keys.values().filter(|k| k.is_current()).count(),
            1
        );
    }

    #[test]
    fn evict_only_past_expiry() {
        let mut ring = KeyRing::default();
        ring.promote(key("k1", 0), 0);
        ring.promote(key("k2", 5), 20);

        assert!(ring.evict_expired(20).is_empty());
        assert!(ring.get("k1").is_some());
        assert!(!ring.has_expired(20));

        assert!(ring.has_expired(21));
        assert_eq!(ring.evict_expired(21), vec!["k1".to_owned()]);
        assert!(ring.evict_expired(21).is_empty());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn current_key_survives_eviction() {
        let mut ring = KeyRing::default();
        ring.promote(key("k1", 0), 0);
        assert!(ring.evict_expired(i64::MAX).is_empty());
        assert_eq!(ring.current().unwrap().id, "k1");
    }

    #[test]
    fn live_orders_current_first() {
        let mut ring = KeyRing::default();
        ring.promote(key("k1", 0), 0);
        ring.promote(key("k2", 10), 100);
        ring.promote(key("k3", 20), 200);

        let ids: Vec<&str> =
            ring.live(50).iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["k3", "k2", "k1"]);

        let ids: Vec<&str> =
            ring.live(150).iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["k3", "k2"]);
    }
}
