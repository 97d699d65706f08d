//! Durable client-side key-value storage.
//!
//! Values are JSON blobs addressed by a fixed string key. Reads are served from
//! memory; `set`/`remove` update memory first and then write through, so a write
//! is visible to the very next read.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        (**self).remove(key)
    }
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Single JSON object file holding every key.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file opens empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Map<String, Value> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("store: ignoring malformed {}", path.display());
                Map::new()
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
