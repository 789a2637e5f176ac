use std::{collections::HashMap, sync::RwLock};

use tracing::debug;

use rota_slo::{errors, Result};

use crate::refresh_token::{RefreshStore, RefreshToken};

/// Process-local refresh token store. Entries do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryRefreshStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefreshStore for MemoryRefreshStore {
    fn put(&self, input: RefreshToken) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(errors::any)?;
        tokens.insert(input.id.clone(), input);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<RefreshToken>> {
        let tokens = self.tokens.read().map_err(errors::any)?;
        Ok(tokens.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut tokens = self.tokens.write().map_err(errors::any)?;
        Ok(tokens.remove(id).is_some())
    }

    fn delete_by_subject(&self, subject: &str) -> Result<usize> {
        let mut tokens = self.tokens.write().map_err(errors::any)?;
        let before = tokens.len();
        tokens.retain(|_, token| token.subject != subject);
        let removed = before - tokens.len();
        debug!("removed {} refresh tokens of {}", removed, subject);
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        let tokens = self.tokens.read().map_err(errors::any)?;
        Ok(tokens.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: &str, subject: &str) -> RefreshToken {
        RefreshToken {
            id: id.to_owned(),
            subject: subject.to_owned(),
            created_at: 0,
            expires_at: 100,
        }
    }

    #[test]
    fn put_get_delete() {
        let store = MemoryRefreshStore::new();
        store.put(token("a", "user1")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(token("a", "user1")));
        assert_eq!(store.get("b").unwrap(), None);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn delete_by_subject_keeps_others() {
        let store = MemoryRefreshStore::new();
        store.put(token("a", "user1")).unwrap();
        store.put(token("b", "user1")).unwrap();
        store.put(token("c", "admin")).unwrap();

        assert_eq!(store.delete_by_subject("user1").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get("c").unwrap().is_some());
    }
}
