use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};
use uuid::Uuid;

/// Thread-safe key/value store behind one coarse lock. Values are written
/// rarely (one batch per refresh), so contention is not a concern; what
/// matters is that a batch is observed all-or-nothing.
pub struct CacheStore<V> {
    identifier: String,
    inner: Mutex<HashMap<String, V>>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        debug!("Cache store '{identifier}' initialized.");
        Self {
            identifier,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let map = self.inner.lock().expect("cache store lock poisoned");
        map.keys().cloned().collect()
    }

    /// An absent key is a miss, not an error.
    pub fn get(&self, key: &str) -> Option<V> {
        let map = self.inner.lock().expect("cache store lock poisoned");
        match map.get(key) {
            Some(value) => Some(value.clone()),
            None => {
                debug!("[{}] Cache item for key [{key}] not found.", self.identifier);
                None
            }
        }
    }

    /// Setting `None` deletes the key.
    pub fn set(&self, key: &str, value: Option<V>) {
        let mut map = self.inner.lock().expect("cache store lock poisoned");
        Self::apply(&self.identifier, &mut map, key, value);
    }

    /// Applies every entry while holding a single lock acquisition, so a
    /// concurrent reader sees either none or all of the batch.
    pub fn set_batch(&self, entries: Vec<(String, Option<V>)>) {
        if entries.is_empty() {
            return;
        }
        let mut map = self.inner.lock().expect("cache store lock poisoned");
        for (key, value) in entries {
            Self::apply(&self.identifier, &mut map, &key, value);
        }
    }

    fn apply(identifier: &str, map: &mut HashMap<String, V>, key: &str, value: Option<V>) {
        match value {
            Some(value) => {
                debug!("[{identifier}] Setting cache item for key [{key}].");
                map.insert(key.to_string(), value);
            }
            None => {
                if map.remove(key).is_some() {
                    warn!("[{identifier}] Deleting cache item for key [{key}].");
                } else {
                    debug!("[{identifier}] Cache item for key [{key}] not found. Skipping deletion.");
                }
            }
        }
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(format!("cache-store-{}", Uuid::new_v4()))
    }
}
