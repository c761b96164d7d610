//! Ephemeral session cache for archive recovery passwords.
//!
//! Holds only archive passwords, keyed `archive_password_{archive_id}`.
//! Dies with the session; entries are removed explicitly after any recovery
//! attempt, successful or not.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key pattern for cached archive passwords.
pub fn password_cache_key(archive_id: &str) -> String {
    format!("archive_password_{archive_id}")
}

/// Session-scoped string cache.
#[derive(Clone, Default)]
pub struct SessionCache {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: &str, value: String) {
        self.values.write().await.insert(key.to_string(), value);
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) {
        self.values.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.values.write().await.clear();
    }
}
