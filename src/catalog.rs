//! JSON file catalog.
//!
//! A small stand-in for the capture index: one JSON document listing every
//! archived file. It resolves file markers for the reader and serves the
//! expiry worker's listing and deletes.
//!
//! ```json
//! {
//!   "files": [
//!     {
//!       "node": "node1",
//!       "num": 5,
//!       "name": "s3://us-east-1/pcaps/node1/000005-node1.pcap.gz",
//!       "compressionBlockSize": 100000,
//!       "firstTimestamp": "2024-01-01T00:00:00Z"
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pcapvault_core::{
    ArchivedFile, FileIndex, FileInfo, FileResolver, IndexError, LocateError,
};

use crate::error::CatalogError;

/// One archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub node: String,
    pub num: u64,
    pub name: String,
    /// Zero for raw files
    #[serde(default)]
    pub compression_block_size: u64,
    pub first_timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    files: Vec<CatalogEntry>,
}

/// File catalog kept in memory and optionally persisted to a JSON file.
#[derive(Debug, Default)]
pub struct JsonCatalog {
    path: Option<PathBuf>,
    entries: RwLock<Vec<CatalogEntry>>,
}

impl JsonCatalog {
    /// Create an in-memory catalog.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            path: None,
            entries: RwLock::new(entries),
        }
    }

    /// Load a catalog file. Deletes are written back to the same file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CatalogError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let document: CatalogDocument =
            serde_json::from_slice(&data).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), files = document.files.len(), "Loaded catalog");
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(document.files),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the current entries back to the catalog file, if any.
    pub async fn save(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let document = CatalogDocument {
            files: self.entries(),
        };
        let persist_err = |reason: String| CatalogError::Persist {
            path: path.display().to_string(),
            reason,
        };

        let data = serde_json::to_vec_pretty(&document).map_err(|e| persist_err(e.to_string()))?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| persist_err(e.to_string()))
    }

    fn find(&self, node: &str, num: u64) -> Option<CatalogEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.node == node && e.num == num)
            .cloned()
    }
}

#[async_trait]
impl FileResolver for JsonCatalog {
    async fn resolve(&self, node: &str, num: u64) -> Result<Option<FileInfo>, LocateError> {
        self.find(node, num)
            .map(|entry| FileInfo::new(entry.num, &entry.name, entry.compression_block_size))
            .transpose()
    }
}

#[async_trait]
impl FileIndex for JsonCatalog {
    async fn expired_files(&self, before: DateTime<Utc>) -> Result<Vec<ArchivedFile>, IndexError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.first_timestamp < before)
            .map(|e| ArchivedFile {
                node: e.node.clone(),
                num: e.num,
                name: e.name.clone(),
                first_timestamp: e.first_timestamp,
            })
            .collect())
    }

    async fn delete_file(&self, node: &str, num: u64) -> Result<(), IndexError> {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|e| !(e.node == node && e.num == num));
            before != entries.len()
        };

        if removed {
            self.save().await.map_err(|e| IndexError(e.to_string()))?;
        }
        Ok(())
    }
}
