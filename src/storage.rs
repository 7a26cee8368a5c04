//! Storage backend abstraction for trust state
//!
//! The trust subsystem persists two kinds of blobs: the application-scoped
//! trusted-folder list and the workspace-scoped trust memento. The backend
//! is an opaque key/value store; when another process (e.g. a second window)
//! mutates a key, the backend fires `on_external_change` with that key.

use crate::error::{Result, TrustError};
use crate::events::EventEmitter;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scope a key is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Shared across all workspaces on this machine
    Application,
    /// Private to the current workspace
    Workspace,
}

pub trait TrustStorage: Send + Sync {
    fn get(&self, key: &str, scope: StorageScope) -> Option<String>;

    fn store(&self, key: &str, value: &str, scope: StorageScope) -> Result<()>;

    fn remove(&self, key: &str, scope: StorageScope) -> Result<()>;

    /// Fired with the key when another process changed it
    fn on_external_change(&self) -> &EventEmitter<String>;
}

/// In-memory backend for tests and single-process hosts
pub struct MemoryStorage {
    values: std::sync::Mutex<HashMap<(StorageScope, String), String>>,
    external_change: EventEmitter<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            values: std::sync::Mutex::new(HashMap::new()),
            external_change: EventEmitter::new(),
        }
    }

    /// Simulate another process writing a key: stores the value and fires
    /// the external-change event.
    pub fn apply_external(&self, key: &str, value: &str, scope: StorageScope) {
        self.values
            .lock()
            .expect("storage map poisoned")
            .insert((scope, key.to_string()), value.to_string());
        self.external_change.fire(&key.to_string());
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStorage for MemoryStorage {
    fn get(&self, key: &str, scope: StorageScope) -> Option<String> {
        self.values
            .lock()
            .expect("storage map poisoned")
            .get(&(scope, key.to_string()))
            .cloned()
    }

    fn store(&self, key: &str, value: &str, scope: StorageScope) -> Result<()> {
        self.values
            .lock()
            .expect("storage map poisoned")
            .insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str, scope: StorageScope) -> Result<()> {
        self.values
            .lock()
            .expect("storage map poisoned")
            .remove(&(scope, key.to_string()));
        Ok(())
    }

    fn on_external_change(&self) -> &EventEmitter<String> {
        &self.external_change
    }
}

/// File-backed storage: one pretty-JSON file per scope under a directory
pub struct FileStorage {
    dir: PathBuf,
    cache: std::sync::Mutex<HashMap<StorageScope, BTreeMap<String, String>>>,
    external_change: EventEmitter<String>,
}

impl FileStorage {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(FileStorage {
            dir: dir.to_path_buf(),
            cache: std::sync::Mutex::new(HashMap::new()),
            external_change: EventEmitter::new(),
        })
    }

    /// Default per-user location via the standard directories convention
    pub fn default_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "workspace-trust").ok_or_else(|| {
            TrustError::Storage("failed to determine project directories".to_string())
        })?;
        Ok(dirs.data_dir().to_path_buf())
    }

    fn scope_file(&self, scope: StorageScope) -> PathBuf {
        let name = match scope {
            StorageScope::Application => "application.json",
            StorageScope::Workspace => "workspace.json",
        };
        self.dir.join(name)
    }

    fn read_scope(&self, scope: StorageScope) -> BTreeMap<String, String> {
        let path = self.scope_file(scope);
        if !path.exists() {
            return BTreeMap::new();
        }
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("discarding unparsable storage file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) => {
                tracing::warn!("failed to read storage file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn with_scope<R>(
        &self,
        scope: StorageScope,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> R {
        let mut cache = self.cache.lock().expect("storage cache poisoned");
        let entries = cache.entry(scope).or_insert_with(|| self.read_scope(scope));
        f(entries)
    }

    fn write_scope(&self, scope: StorageScope, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.scope_file(scope);
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&path, content)?;
        debug!("persisted {} storage keys to {}", entries.len(), path.display());
        Ok(())
    }

    /// Drop the cached scope and re-read it from disk, firing the
    /// external-change event for `key`. Hosts call this when a file watcher
    /// reports a write by another process.
    pub fn reload_external(&self, key: &str, scope: StorageScope) {
        {
            let mut cache = self.cache.lock().expect("storage cache poisoned");
            cache.remove(&scope);
        }
        self.external_change.fire(&key.to_string());
    }
}

impl TrustStorage for FileStorage {
    fn get(&self, key: &str, scope: StorageScope) -> Option<String> {
        self.with_scope(scope, |entries| entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str, scope: StorageScope) -> Result<()> {
        let snapshot = self.with_scope(scope, |entries| {
            entries.insert(key.to_string(), value.to_string());
            entries.clone()
        });
        self.write_scope(scope, &snapshot)
    }

    fn remove(&self, key: &str, scope: StorageScope) -> Result<()> {
        let (snapshot, removed) = self.with_scope(scope, |entries| {
            let removed = entries.remove(key).is_some();
            (entries.clone(), removed)
        });
        if removed {
            self.write_scope(scope, &snapshot)?;
        }
        Ok(())
    }

    fn on_external_change(&self) -> &EventEmitter<String> {
        &self.external_change
    }
}
