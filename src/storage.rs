//! Persistent storage seam for the session snapshot.
//!
//! The contract is deliberately infallible: storage failures are treated as
//! absence on read, and logged and dropped on write, so a broken disk never
//! takes the session machinery down with it.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

/// A process-wide key-value string store surviving restarts.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

impl<T: SessionStorage + ?Sized> SessionStorage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

/// In-memory storage; nothing survives the process. For tests and embedders
/// that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .map(|entries| entries.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// File-backed storage: one JSON file per key under a caller-supplied
/// directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(error) = fs::create_dir_all(&self.dir) {
            warn!(%error, dir = %self.dir.display(), "failed to create storage directory");
            return;
        }
        if let Err(error) = fs::write(self.path(key), value) {
            warn!(%error, key, "failed to persist session snapshot");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(error) = fs::remove_file(self.path(key)) {
            if error.kind() != ErrorKind::NotFound {
                warn!(%error, key, "failed to remove session snapshot");
            }
        }
    }
}
