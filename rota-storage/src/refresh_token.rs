use mockall::automock;
use serde::{Deserialize, Serialize};

use rota_slo::Result;

/// A registered refresh token. `id` is a digest of the token value, the
/// value itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RefreshToken {
    pub id: String,
    pub subject: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[automock]
pub trait RefreshStore: Send + Sync {
    fn put(&self, input: RefreshToken) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<RefreshToken>>;
    /// Returns whether an entry was removed.
    fn delete(&self, id: &str) -> Result<bool>;
    /// Removes every entry of `subject` and returns how many were removed.
    fn delete_by_subject(&self, subject: &str) -> Result<usize>;
    fn count(&self) -> Result<usize>;
}
