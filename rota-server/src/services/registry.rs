use std::sync::Arc;

use base64::engine::{general_purpose, Engine};
use sha2::{Digest, Sha256};
use tracing::info;

use rota_slo::{Clock, Result};
use rota_storage::{RefreshStore, RefreshToken};

/// Tracks which refresh tokens were issued and to whom. Revocation here is
/// the only way to stop a refresh token before it expires.
pub struct RefreshRegistry<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S> RefreshRegistry<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn digest(token: &str) -> String {
        general_purpose::STANDARD
            .encode(Sha256::new_with_prefix(token).finalize())
    }
}

impl<S> RefreshRegistry<S>
where
    S: RefreshStore,
{
    pub fn register(
        &self,
        token: &str,
        subject: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.store.put(RefreshToken {
            id: Self::digest(token),
            subject: subject.to_owned(),
            created_at: self.clock.now(),
            expires_at,
        })
    }

    /// Whether `token` is registered and was issued to `subject`.
    pub fn is_valid(&self, token: &str, subject: &str) -> Result<bool> {
        Ok(self
            .store
            .get(&Self::digest(token))?
            .is_some_and(|entry| entry.subject == subject))
    }

    pub fn revoke(&self, token: &str) -> Result<bool> {
        let revoked = self.store.delete(&Self::digest(token))?;
        if revoked {
            info!("revoked a refresh token");
        }
        Ok(revoked)
    }

    pub fn revoke_subject(&self, subject: &str) -> Result<usize> {
        let revoked = self.store.delete_by_subject(subject)?;
        info!("revoked {} refresh tokens of {}", revoked, subject);
        Ok(revoked)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.count()
    }
}

impl<S> std::fmt::Debug for RefreshRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRegistry").finish_non_exhaustive()
    }
}
