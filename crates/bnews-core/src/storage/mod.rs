//! Credential persistence.
//!
//! `CredentialStore` is a small string key-value contract. The session layer
//! only ever touches the four keys named by [`StorageKey`].

use std::fmt;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Well-known keys used by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    Username,
    Nickname,
}

impl StorageKey {
    pub const ALL: [StorageKey; 4] = [
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::Username,
        StorageKey::Nickname,
    ];

    /// Key string as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::AccessToken => "accessToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::Username => "username",
            StorageKey::Nickname => "nickname",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by credential store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Keys must be non-empty.
    EmptyKey,
    /// Underlying I/O failed.
    Io { path: String, message: String },
    /// Persisted data could not be parsed.
    Corrupted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::EmptyKey => write!(f, "storage key must not be empty"),
            StorageError::Io { path, message } => write!(f, "{path}: {message}"),
            StorageError::Corrupted(msg) => write!(f, "corrupted credential data: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Thread-safe string key-value store for credentials.
pub trait CredentialStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    /// `StorageError::EmptyKey` for an empty key, or a backend failure.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// `StorageError::EmptyKey` for an empty key, or a backend failure.
    fn set(&self, value: &str, key: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    /// `StorageError::EmptyKey` for an empty key, or a backend failure.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Reads a well-known key.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        self.get(key.as_str())
    }

    /// Writes (`Some`) or clears (`None`) a well-known key.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn store(&self, key: StorageKey, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.set(value, key.as_str()),
            None => self.remove(key.as_str()),
        }
    }

    /// Applies several writes. Backends that can persist them as one unit
    /// override this; the default applies them in order and stops at the
    /// first failure.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn store_all(&self, updates: &[(StorageKey, Option<&str>)]) -> Result<(), StorageError> {
        for &(key, value) in updates {
            self.store(key, value)?;
        }
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        Err(StorageError::EmptyKey)
    } else {
        Ok(())
    }
}
