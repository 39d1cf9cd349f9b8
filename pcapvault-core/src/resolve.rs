//! File metadata resolution.
//!
//! A session's negative `packetPos` entries are file markers; the index maps
//! `(node, |marker|)` to the stored file name and its compression block size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{LocateError, PlanError};
use crate::io::{Compression, ObjectLocation};

/// Metadata of one archived pcap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File number (absolute value of its marker)
    pub num: u64,
    /// Stored name, e.g. `s3://region/bucket/node/file.pcap.gz`
    pub name: String,
    /// Size of each compressed block; ignored for raw files
    pub compression_block_size: u64,
    /// Scheme derived from the name's extension
    pub compression: Compression,
    /// Parsed object location
    pub location: ObjectLocation,
}

impl FileInfo {
    /// Build file metadata from an index entry.
    pub fn new(num: u64, name: &str, compression_block_size: u64) -> Result<Self, LocateError> {
        Ok(Self {
            num,
            name: name.to_string(),
            compression_block_size,
            compression: Compression::from_file_name(name),
            location: ObjectLocation::parse(name)?,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_compressed()
    }

    /// Block size of a compressed file, rejecting zero.
    pub fn block_size(&self) -> Result<u64, PlanError> {
        if self.compression_block_size == 0 {
            Err(PlanError::MissingBlockSize {
                name: self.name.clone(),
            })
        } else {
            Ok(self.compression_block_size)
        }
    }
}

/// Maps a file marker to file metadata.
#[async_trait]
pub trait FileResolver: Send + Sync {
    /// Resolve file `num` written by `node`. `Ok(None)` means the index has
    /// no such file.
    async fn resolve(&self, node: &str, num: u64) -> Result<Option<FileInfo>, LocateError>;
}

/// In-memory resolver.
#[derive(Debug, Default)]
pub struct StaticResolver {
    files: RwLock<HashMap<(String, u64), FileInfo>>,
    lookups: AtomicU64,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, node: &str, info: FileInfo) {
        self.files.write().insert((node.to_string(), info.num), info);
    }

    pub fn remove(&self, node: &str, num: u64) -> Option<FileInfo> {
        self.files.write().remove(&(node.to_string(), num))
    }

    /// Number of resolve calls served.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FileResolver for StaticResolver {
    async fn resolve(&self, node: &str, num: u64) -> Result<Option<FileInfo>, LocateError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.files.read().get(&(node.to_string(), num)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_info_from_name() {
        let info = FileInfo::new(5, "s3://us-east-1/pcaps/node1/000005-230101-1.pcap.gz", 100000)
            .unwrap();
        assert_eq!(info.compression, Compression::Gzip);
        assert!(info.is_compressed());
        assert_eq!(info.location.bucket(), "pcaps");
        assert_eq!(info.block_size(), Ok(100000));
    }

    #[test]
    fn test_zero_block_size() {
        let info = FileInfo::new(1, "s3://r/b/n/1.pcap.zst", 0).unwrap();
        assert!(matches!(
            info.block_size(),
            Err(PlanError::MissingBlockSize { .. })
        ));
    }

    #[test]
    fn test_invalid_name() {
        assert!(FileInfo::new(1, "/data/pcap/1.pcap", 0).is_err());
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new();
        resolver.insert("node1", FileInfo::new(2, "s3://r/b/n/2.pcap", 0).unwrap());

        assert!(resolver.resolve("node1", 2).await.unwrap().is_some());
        assert!(resolver.resolve("node1", 3).await.unwrap().is_none());
        assert!(resolver.resolve("node2", 2).await.unwrap().is_none());
        assert_eq!(resolver.lookups(), 3);

        resolver.remove("node1", 2);
        assert!(resolver.resolve("node1", 2).await.unwrap().is_none());
    }
}
