//! Secure key-value store abstraction.
//!
//! The host application supplies the real implementation, which must encrypt
//! values at rest. Pin records only ever use these four operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::error::Error;

/// Encrypted string store. I/O failures must be reported as [`Error::Storage`].
pub trait SecureStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, Error>;

    fn put_string(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Removing an absent key is not an error.
    fn remove_key(&self, key: &str) -> Result<(), Error>;

    fn list_entries_with_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, Error>;
}

/// In-memory store, for tests and for hosts that encrypt at another layer.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecureStore for MemoryStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_key(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn list_entries_with_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, Error> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
