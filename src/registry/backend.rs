//! Where the registry document lives.
//!
//! The store talks to a [`RegistryBackend`]; the JSON file backend is what the
//! binary uses, the memory backend is for tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
#[cfg(test)]
use std::path::Path;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::{fs, io};
use tracing::warn;

use super::script::ScriptDefinition;

/// Script name → definition.
pub type Registry = BTreeMap<String, ScriptDefinition>;

/// Entries that could not be read as a [`ScriptDefinition`], as found on disk.
pub type RawEntries = BTreeMap<String, Value>;

/// Default file name of the registry document.
pub const DEFAULT_REGISTRY_FILE: &str = "scripts-registry.json";

/// The registry document: readable scripts plus any entries that failed to
/// parse. Unreadable entries are written back unchanged on every save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub scripts: Registry,
    pub unreadable: RawEntries,
}

impl Document {
    pub fn new(scripts: Registry) -> Self {
        Self {
            scripts,
            unreadable: RawEntries::new(),
        }
    }

    /// Sort raw entries into scripts and unreadable leftovers.
    fn from_raw(raw: RawEntries) -> Self {
        let mut doc = Self::default();
        for (key, value) in raw {
            match ScriptDefinition::deserialize(&value) {
                Ok(def) => {
                    doc.scripts.insert(key, def);
                }
                Err(e) => {
                    warn!(entry = %key, error = %e, "unreadable registry entry, keeping it untouched");
                    doc.unreadable.insert(key, value);
                }
            }
        }
        doc
    }

    /// Every entry in name order; a script shadows an unreadable entry of the
    /// same name.
    fn entries(&self) -> BTreeMap<&str, Entry<'_>> {
        let mut entries: BTreeMap<&str, Entry<'_>> = self
            .unreadable
            .iter()
            .map(|(k, v)| (k.as_str(), Entry::Raw(v)))
            .collect();
        for (name, def) in &self.scripts {
            entries.insert(name.as_str(), Entry::Script(def));
        }
        entries
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Entry<'a> {
    Script(&'a ScriptDefinition),
    Raw(&'a Value),
}

/// Errors reading or writing the registry document.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load/save port for the registry document.
pub trait RegistryBackend {
    /// Read the document. `Ok(None)` means no document exists yet; an error
    /// means it exists but is not a JSON object.
    fn load(&self) -> Result<Option<Document>, PersistError>;

    /// Replace the document with `doc`.
    fn save(&self, doc: &Document) -> Result<(), PersistError>;

    /// Human-readable location, for log messages.
    fn describe(&self) -> String;
}

/// A pretty-printed JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Document>, PersistError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)?;
        let raw: RawEntries = serde_json::from_str(&data)?;
        Ok(Some(Document::from_raw(raw)))
    }

    fn save(&self, doc: &Document) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&doc.entries())?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory document. Clones share the same document, so a test can keep a
/// handle and inspect what the store wrote.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryDoc>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MemoryDoc {
    doc: Option<Document>,
    fail_saves: bool,
    saves: usize,
}

#[cfg(test)]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing document.
    pub fn with_registry(registry: Registry) -> Self {
        let backend = Self::default();
        backend.lock().doc = Some(Document::new(registry));
        backend
    }

    /// Make every following save fail with an IO error.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Snapshot of the stored scripts.
    pub fn snapshot(&self) -> Option<Registry> {
        self.lock().doc.as_ref().map(|d| d.scripts.clone())
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryDoc> {
        // A poisoned lock only means a test panicked mid-save; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl RegistryBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Document>, PersistError> {
        Ok(self.lock().doc.clone())
    }

    fn save(&self, doc: &Document) -> Result<(), PersistError> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(PersistError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "simulated write failure",
            )));
        }
        inner.doc = Some(doc.clone());
        inner.saves += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
