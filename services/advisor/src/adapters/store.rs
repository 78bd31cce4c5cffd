//! services/advisor/src/adapters/store.rs
//!
//! Durable and session-scoped key-value stores implementing the
//! `KeyValueStore` port. The port contract is fail-safe: reads that go
//! wrong are `None`, writes that go wrong are swallowed. The swallows are
//! deliberate and logged so failures stay observable in diagnostics.

use maker_price_core::ports::KeyValueStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

//=========================================================================================
// JsonFileStore (Durable, One JSON Document On Disk)
//=========================================================================================

/// A durable store backed by a single JSON document on disk. The browser
/// original kept these entries in local storage; here they live under the
/// service's data directory.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading any existing document. A missing
    /// or corrupt document starts the store empty rather than failing.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Ignoring corrupt store document at {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) => {
                debug!("No store document at {:?} ({}); starting empty", path, e);
                HashMap::new()
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let raw = match serde_json::to_string_pretty(entries) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Failed to encode store document: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!("Failed to create store directory {:?}: {}", parent, e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, raw) {
            debug!("Failed to write store document {:?}: {}", self.path, e);
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.read() {
            Ok(entries) => entries.get(key).cloned(),
            Err(e) => {
                debug!("Store read lock poisoned: {}", e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value.to_string());
                self.persist(&entries);
            }
            Err(e) => debug!("Store write lock poisoned: {}", e),
        }
    }

    fn remove(&self, key: &str) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.remove(key);
                self.persist(&entries);
            }
            Err(e) => debug!("Store write lock poisoned: {}", e),
        }
    }
}

//=========================================================================================
// MemoryStore (Session-Scoped)
//=========================================================================================

/// An in-memory store that lives and dies with the process, mirroring the
/// browser's session storage. Used for one-time-use link tokens.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}
