//! Persistent JSON document store.
//!
//! Each logical document (id cache, search cache, credentials) is one JSON
//! file in the cache directory. Writes can merge into the existing top-level
//! object instead of replacing it.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use shared::DataPaths;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Cached title entries keyed by title id
pub const ID_CACHE: &str = "myanimelist_id_cache";
/// Free-text query to title id
pub const SEARCH_CACHE: &str = "myanimelist_search_cache";
/// Client id, tokens and the last reconciliation date
pub const CONFIG: &str = "config";

/// File-backed document store
pub struct DocumentStore {
    paths: DataPaths,
    /// Serializes read-modify-write cycles on the documents
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Create a store rooted at the cache directory of `paths`
    pub fn new(paths: DataPaths) -> Result<Self> {
        std::fs::create_dir_all(paths.cache_dir()).with_context(|| {
            format!(
                "Failed to create cache directory: {}",
                paths.cache_dir().display()
            )
        })?;
        info!(cache_dir = %paths.cache_dir().display(), "Document store initialized");

        Ok(Self {
            paths,
            write_lock: Mutex::new(()),
        })
    }

    /// Read a document, `None` if it does not exist
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        if !path.exists() {
            debug!(document = name, "Document missing");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        let data: T = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse document: {}", path.display()))?;

        Ok(Some(data))
    }

    /// Write a document.
    ///
    /// With `merge`, the top-level keys of `data` are written over the keys
    /// of the stored object and every other stored key is kept. Without it,
    /// the document is replaced.
    pub fn write<T: Serialize>(&self, name: &str, data: &T, merge: bool) -> Result<()> {
        let incoming = serde_json::to_value(data).context("Failed to serialize document")?;

        let _guard = self.lock()?;
        let document = if merge {
            match (self.read::<Value>(name)?, incoming) {
                (Some(Value::Object(mut existing)), Value::Object(update)) => {
                    existing.extend(update);
                    Value::Object(existing)
                }
                (_, incoming) => incoming,
            }
        } else {
            incoming
        };

        self.write_locked(name, &document)?;
        debug!(document = name, merge = merge, "Document stored");
        Ok(())
    }

    /// Remove keys from an object document
    pub fn remove_keys(&self, name: &str, keys: &[&str]) -> Result<()> {
        let _guard = self.lock()?;
        let Some(Value::Object(mut document)) = self.read::<Value>(name)? else {
            return Ok(());
        };
        for key in keys {
            document.remove(*key);
        }
        self.write_locked(name, &Value::Object(document))?;
        debug!(document = name, keys = ?keys, "Document keys removed");
        Ok(())
    }

    /// Delete a document
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove document: {}", path.display()))?;
            info!(document = name, "Document removed");
        }
        Ok(())
    }

    /// Read a document as a JSON object, empty when missing
    pub fn read_object(&self, name: &str) -> Result<Map<String, Value>> {
        match self.read::<Value>(name)? {
            Some(Value::Object(map)) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.paths.document_file(name)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("document store lock poisoned"))
    }

    /// Replace a document on disk; the caller holds `write_lock`
    fn write_locked(&self, name: &str, document: &Value) -> Result<()> {
        let path = self.path(name);
        let content =
            serde_json::to_string_pretty(document).context("Failed to serialize document")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write document: {}", path.display()))
    }
}
