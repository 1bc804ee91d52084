//! File path utilities for locating data files.
//!
//! All persisted documents (id cache, search cache, credentials) live as
//! JSON files in the cache directory; logs go to their own directory.

use crate::config::Config;
use std::path::{Path, PathBuf};

/// File path manager for data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
    cache_dir: PathBuf,
    logs_dir: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths with the default layout under `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            cache_dir: root.join("cache"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    /// Create a DataPaths honouring the directories configured in `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.data_dir(),
            cache_dir: config.cache_dir(),
            logs_dir: config.log_dir(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory holding persisted documents
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get logs directory
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Get the file backing a named document
    pub fn document_file(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", sanitize(name)))
    }

    /// Create all necessary directories
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.root, &self.cache_dir, &self.logs_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Make a document name safe to use as a file name
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}
