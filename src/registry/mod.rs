//! Script registry — named script definitions persisted as one JSON document.
//!
//! The whole registry is held in memory and written through to the backend
//! after every mutation. There is no locking across processes: two tools
//! editing the same file race, and the last writer wins.

mod backend;
mod script;
mod search;

#[cfg(test)]
pub use backend::MemoryBackend;
pub use backend::{
    Document, JsonFileBackend, PersistError, Registry, RegistryBackend, DEFAULT_REGISTRY_FILE,
};
pub use script::{
    builtin_scripts, ArgMap, ArgValue, NewScript, ParamSchema, ParamType, ScriptDefinition,
    ScriptUpdate,
};

use chrono::Utc;
use tracing::{debug, info, warn};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Script '{0}' not found")]
    NotFound(String),
    #[error("Script '{0}' already exists")]
    DuplicateName(String),
    #[error("Invalid script definition: {0}")]
    InvalidDefinition(String),
    #[error("Failed to save script registry: {0}")]
    Persistence(#[from] PersistError),
}

/// The registry, owning every script definition.
pub struct RegistryStore<B: RegistryBackend> {
    backend: B,
    doc: Document,
}

impl<B: RegistryBackend> RegistryStore<B> {
    /// Load the registry from `backend`.
    ///
    /// A missing document, or one that is not a JSON object at all, is
    /// replaced with the built-in scripts, which are saved right away. Entries
    /// that fail to parse one by one are kept aside and written back as they
    /// were; loading never saves.
    pub fn open(backend: B) -> Result<Self, RegistryError> {
        match backend.load() {
            Ok(Some(mut doc)) => {
                for (key, def) in doc.scripts.iter_mut() {
                    if def.name != *key {
                        warn!(key = %key, name = %def.name, "registry entry name differs from its key; using key");
                        def.name = key.clone();
                    }
                }
                info!(
                    location = %backend.describe(),
                    count = doc.scripts.len(),
                    unreadable = doc.unreadable.len(),
                    "loaded script registry"
                );
                return Ok(Self { backend, doc });
            }
            Ok(None) => {
                info!(location = %backend.describe(), "no script registry yet, seeding defaults");
            }
            Err(e) => {
                warn!(
                    location = %backend.describe(),
                    error = %e,
                    "failed to load script registry, seeding defaults"
                );
            }
        }

        let scripts = builtin_scripts(Utc::now())
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        let store = Self {
            backend,
            doc: Document::new(scripts),
        };
        store.persist()?;
        Ok(store)
    }

    /// All definitions, ordered by name.
    pub fn get_all(&self) -> Vec<&ScriptDefinition> {
        self.doc.scripts.values().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ScriptDefinition> {
        self.doc.scripts.get(name)
    }

    /// Registered names, sorted.
    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        self.doc.scripts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.doc.scripts.len()
    }

    /// Register a new script. Both timestamps are set to now.
    ///
    /// A name held by an unreadable entry counts as taken.
    pub fn add(&mut self, request: NewScript) -> Result<&ScriptDefinition, RegistryError> {
        script::check_definition(&request.name, &request.args)
            .map_err(RegistryError::InvalidDefinition)?;
        if self.doc.scripts.contains_key(&request.name)
            || self.doc.unreadable.contains_key(&request.name)
        {
            return Err(RegistryError::DuplicateName(request.name));
        }

        let name = request.name.clone();
        let definition = request.into_definition(Utc::now());
        self.doc.scripts.insert(name.clone(), definition);
        self.persist()?;

        debug!(script = %name, "added script");
        self.doc
            .scripts
            .get(&name)
            .ok_or(RegistryError::NotFound(name))
    }

    /// Merge `update` into an existing script and refresh `updatedAt`.
    pub fn update(
        &mut self,
        name: &str,
        update: ScriptUpdate,
    ) -> Result<&ScriptDefinition, RegistryError> {
        let existing = self
            .doc
            .scripts
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut merged = existing.clone();
        update.apply(&mut merged);
        script::check_definition(&merged.name, &merged.args)
            .map_err(RegistryError::InvalidDefinition)?;
        merged.updated_at = Utc::now();

        self.doc.scripts.insert(name.to_string(), merged);
        self.persist()?;

        debug!(script = %name, "updated script");
        self.doc
            .scripts
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Delete a script, returning the removed definition.
    pub fn remove(&mut self, name: &str) -> Result<ScriptDefinition, RegistryError> {
        let removed = self
            .doc
            .scripts
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.persist()?;

        debug!(script = %name, "removed script");
        Ok(removed)
    }

    /// Definitions whose category equals `category`.
    pub fn filter_by_category(&self, category: &str) -> Vec<&ScriptDefinition> {
        search::by_category(&self.doc.scripts, category)
    }

    /// Definitions whose name or description contains `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<&ScriptDefinition> {
        search::by_keyword(&self.doc.scripts, keyword)
    }

    /// Category filter first, then keyword search over what is left. Empty
    /// strings count as no filter.
    pub fn list(&self, category: Option<&str>, keyword: Option<&str>) -> Vec<&ScriptDefinition> {
        let scripts = match category.filter(|c| !c.is_empty()) {
            Some(c) => self.filter_by_category(c),
            None => self.get_all(),
        };
        match keyword.filter(|k| !k.is_empty()) {
            Some(k) => {
                let hits = self.search(k);
                scripts
                    .into_iter()
                    .filter(|s| hits.iter().any(|h| h.name == s.name))
                    .collect()
            }
            None => scripts,
        }
    }

    fn persist(&self) -> Result<(), RegistryError> {
        self.backend.save(&self.doc).map_err(|e| {
            warn!(location = %self.backend.describe(), error = %e, "failed to save script registry");
            RegistryError::Persistence(e)
        })
    }
}
