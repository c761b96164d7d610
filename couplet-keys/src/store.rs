//! Session-scoped raw key cache.
//!
//! The sole place raw key material lives in memory. Nothing here is durable:
//! the cache dies with the session, so raw keys never survive a restart
//! unencrypted. Durable state is the non-secret `KeyMetadata` handled by the
//! manager.

use couplet_crypto::SymmetricKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Prefix for every cache entry this subsystem owns. `clear_all` removes
/// only entries under this namespace.
const NAMESPACE: &str = "couplet_key_";

/// Thread-safe, session-scoped key cache.
#[derive(Clone, Default)]
pub struct SessionKeyStore {
    keys: Arc<RwLock<HashMap<String, SymmetricKey>>>,
}

impl SessionKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the namespaced cache id for a couple/purpose pair.
    pub fn cache_id(couple_id: &str, purpose: &str) -> String {
        format!("{NAMESPACE}{couple_id}_{purpose}")
    }

    /// Caches raw key material under the given id.
    pub async fn store(&self, key_id: &str, key: SymmetricKey) {
        self.keys.write().await.insert(key_id.to_string(), key);
    }

    /// Returns the cached key, or `None` when absent. Absence is a normal
    /// state (fresh session, cleared keys) — never an error.
    pub async fn retrieve(&self, key_id: &str) -> Option<SymmetricKey> {
        self.keys.read().await.get(key_id).cloned()
    }

    /// Removes one entry, returning whether it was present.
    pub async fn remove(&self, key_id: &str) -> bool {
        self.keys.write().await.remove(key_id).is_some()
    }

    /// Removes every entry in this subsystem's namespace, leaving unrelated
    /// session data untouched.
    pub async fn clear_all(&self) {
        self.keys
            .write()
            .await
            .retain(|id, _| !id.starts_with(NAMESPACE));
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couplet_crypto::generate_key;

    #[tokio::test]
    async fn retrieve_absent_returns_none() {
        let store = SessionKeyStore::new();
        assert!(store.retrieve("couplet_key_nope_diary").await.is_none());
    }

    #[tokio::test]
    async fn store_retrieve_remove() {
        let store = SessionKeyStore::new();
        let key = generate_key();
        let id = SessionKeyStore::cache_id("c1", "diary");

        store.store(&id, key.clone()).await;
        let fetched = store.retrieve(&id).await.unwrap();
        assert_eq!(fetched.as_bytes(), key.as_bytes());

        assert!(store.remove(&id).await);
        assert!(store.retrieve(&id).await.is_none());
        assert!(!store.remove(&id).await);
    }

    #[tokio::test]
    async fn clear_all_spares_foreign_entries() {
        let store = SessionKeyStore::new();
        store
            .store(&SessionKeyStore::cache_id("c1", "diary"), generate_key())
            .await;
        store.store("unrelated_session_value", generate_key()).await;

        store.clear_all().await;

        assert!(
            store
                .retrieve(&SessionKeyStore::cache_id("c1", "diary"))
                .await
                .is_none()
        );
        assert!(store.retrieve("unrelated_session_value").await.is_some());
    }
}
