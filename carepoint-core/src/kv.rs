use std::collections::HashMap;
use std::sync::Mutex;

use crate::{CoreError, CoreResult};

/// String key-value storage the portal keeps client-side state in.
///
/// Two instances exist per portal: a durable one holding the session record
/// and a transient one (scoped to a single portal run) holding the vitals
/// draft.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> CoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> CoreResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// In-memory store, used as the transient store and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| CoreError::StorageError("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
