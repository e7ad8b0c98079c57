//! Durable small-value store
//!
//! A flat string-to-string map standing in for cookies and local storage.
//! Reads never fail: a missing or unreadable value is simply absent.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Current-minutes key
pub const MINUTES_KEY: &str = "minutes";
/// Current-seconds key
pub const SECONDS_KEY: &str = "seconds";
/// Admin-configured initial minutes key
pub const INITIAL_MINUTES_KEY: &str = "initialMinutes";
/// Admin-configured initial seconds key
pub const INITIAL_SECONDS_KEY: &str = "initialSeconds";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Parse an unsigned integer stored under `key`
pub fn get_u64(store: &dyn KeyValueStore, key: &str) -> Option<u64> {
    store.get(key).and_then(|raw| raw.trim().parse().ok())
}

/// Values kept only for the life of the process
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Values persisted as one JSON object on disk.
///
/// Every `set` rewrites the file through a temp file and rename, so a crash
/// never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing, empty or corrupt file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = Self::load(&path);
        debug!("Opened key/value store at {} ({} keys)", path.display(), values.len());
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        if content.trim().is_empty() {
            return BTreeMap::new();
        }
        match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!("Ignoring unreadable store file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(values)?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp_file = NamedTempFile::new_in(&parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        if values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        // Memory only changes once the file holds the new value
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}
