//! File-backed credential store.
//!
//! Stores credentials in `<base>/credentials.json` with restricted
//! permissions (0600). Values are never logged.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{CredentialStore, StorageError, StorageKey, check_key};
use crate::config::paths;

type Entries = BTreeMap<String, String>;

/// JSON credential file. Every mutation rewrites the whole file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Store at the default location (`${BNEWS_HOME}/credentials.json`).
    pub fn open_default() -> Self {
        Self::new(paths::credentials_path())
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries. A missing file is an empty store.
    fn load_entries(&self) -> Result<Entries, StorageError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(&e))?;
        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            StorageError::Corrupted(format!("{}: {e}", self.path.display()))
        })
    }

    /// Saves all entries via temp file + rename, with 0600 permissions on unix.
    fn save_entries(&self, entries: &Entries) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(&e))?;
        }

        let contents = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Corrupted(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path).map_err(|e| self.io_error(&e))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error(&e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(&e))?;
        debug!(path = %self.path.display(), entries = entries.len(), "credential file saved");
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut Entries) -> bool) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load_entries()?;
        if f(&mut entries) {
            self.save_entries(&entries)?;
        }
        Ok(())
    }

    fn io_error(&self, err: &io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        check_key(key)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load_entries()?.remove(key))
    }

    fn set(&self, value: &str, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.mutate(|entries| entries.remove(key).is_some())
    }

    /// One read-modify-write cycle: either every update lands or none does.
    fn store_all(&self, updates: &[(StorageKey, Option<&str>)]) -> Result<(), StorageError> {
        self.mutate(|entries| {
            let mut changed = false;
            for &(key, value) in updates {
                let key = key.as_str();
                changed |= match value {
                    Some(value) => {
                        entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
                    }
                    None => entries.remove(key).is_some(),
                };
            }
            changed
        })
    }
}
