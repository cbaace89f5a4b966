use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CredentialStore, StorageError, StorageKey, check_key};

/// In-process credential store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        check_key(key)?;
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, value: &str, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.values().remove(key);
        Ok(())
    }

    fn store_all(&self, updates: &[(StorageKey, Option<&str>)]) -> Result<(), StorageError> {
        let mut values = self.values();
        for &(key, value) in updates {
            match value {
                Some(value) => values.insert(key.as_str().to_string(), value.to_string()),
                None => values.remove(key.as_str()),
            };
        }
        Ok(())
    }
}
