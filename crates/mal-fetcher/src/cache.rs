//! Typed access to the id cache, the search cache and the reconciliation date.

use crate::models::CatalogEntry;
use crate::store::{DocumentStore, CONFIG, ID_CACHE, SEARCH_CACHE};
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const CHECKED_DATE_KEY: &str = "checked_date";

/// Cached entries as read from disk
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub entries: BTreeMap<String, CatalogEntry>,
    /// Ids whose stored record no longer decodes
    pub unreadable: Vec<String>,
}

/// Cache over the persisted documents
#[derive(Clone)]
pub struct AnimeCache {
    store: Arc<DocumentStore>,
}

impl AnimeCache {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Read every cached entry
    pub fn snapshot(&self) -> Result<CacheSnapshot> {
        let mut snapshot = CacheSnapshot::default();
        for (id, raw) in self.store.read_object(ID_CACHE)? {
            match serde_json::from_value::<CatalogEntry>(raw) {
                Ok(entry) => {
                    snapshot.entries.insert(id, entry);
                }
                Err(e) => {
                    warn!(anime_id = %id, error = %e, "Unreadable cache entry");
                    snapshot.unreadable.push(id);
                }
            }
        }
        Ok(snapshot)
    }

    /// Whether anything has been cached yet
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.read_object(ID_CACHE)?.is_empty())
    }

    /// Merge one entry into the id cache
    pub fn put(&self, anime_id: &str, entry: &CatalogEntry) -> Result<()> {
        self.store
            .write(ID_CACHE, &json!({ anime_id: entry }), true)
    }

    /// Merge several entries into the id cache
    pub fn put_all(&self, entries: &BTreeMap<String, CatalogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.store.write(ID_CACHE, entries, true)
    }

    /// Date of the last reconciliation pass
    pub fn checked_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .store
            .read_object(CONFIG)?
            .get(CHECKED_DATE_KEY)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
    }

    pub fn set_checked_date(&self, date: NaiveDate) -> Result<()> {
        let mut update = Map::new();
        update.insert(
            CHECKED_DATE_KEY.to_string(),
            json!(date.format("%Y-%m-%d").to_string()),
        );
        self.store.write(CONFIG, &Value::Object(update), true)
    }

    /// Resolved title id for a search query
    pub fn search(&self, query: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .read_object(SEARCH_CACHE)?
            .get(query)
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }))
    }

    pub fn put_search(&self, query: &str, anime_id: &str) -> Result<()> {
        self.store
            .write(SEARCH_CACHE, &json!({ query: anime_id }), true)
    }

    /// Drop both caches and forget the reconciliation date
    pub fn clear(&self) -> Result<()> {
        self.store.remove(ID_CACHE)?;
        self.store.remove(SEARCH_CACHE)?;
        self.store.remove_keys(CONFIG, &[CHECKED_DATE_KEY])?;
        info!("Cache cleared");
        Ok(())
    }
}
