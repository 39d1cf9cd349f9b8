//! Error types for pcapvault-core.
//!
//! This module provides structured error types for the read path:
//!
//! - [`enum@Error`] - Main error enum reported once per session
//! - [`PlanError`] - Malformed packet position lists
//! - [`LocateError`] - File metadata that cannot be resolved
//! - [`FetchError`] - Object store and decompression failures
//! - [`PcapError`] - Global header and record problems
//! - [`StoreError`] - Failures reported by an [`ObjectStoreClient`](crate::ObjectStoreClient)
//! - [`IndexError`] - Failures reported by a [`FileIndex`](crate::FileIndex)
//! - [`ExpireError`] - Why the expiry worker left a file in place
//!
//! [`FetchError`] is `Clone`: a single failed fetch is handed to every
//! session waiting on the same block.

use thiserror::Error;

/// Main error type for pcapvault-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The packet position list could not be turned into a fetch plan
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// A file marker could not be resolved to file metadata
    #[error("{0}")]
    Locate(#[from] LocateError),

    /// Fetching or decompressing a block failed
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// The archived pcap data is malformed
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// The packet sink refused a packet
    #[error("Packet sink error: {0}")]
    Sink(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while planning byte ranges for a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A packet offset appeared before any file marker
    #[error("packet offset {pos} at index {index} has no preceding file marker")]
    MissingFileMarker { index: usize, pos: i64 },

    /// An absolute offset of zero points at the global header, not a packet
    #[error("packet offset at index {index} is zero")]
    ZeroOffset { index: usize },

    /// A marker has no resolved file metadata
    #[error("no file metadata resolved for file {num}")]
    UnresolvedFile { num: u64 },

    /// A compressed file reported a zero block size
    #[error("compressed file {name} has no compression block size")]
    MissingBlockSize { name: String },

    /// Unknown `packetPosEncoding`
    #[error("unsupported packet position encoding: {0}")]
    UnknownEncoding(String),
}

/// Errors raised while resolving file metadata.
#[derive(Error, Debug, Clone)]
pub enum LocateError {
    /// The index has no entry for this file
    #[error("Only have SPI data, pcap file no longer available for {node}-{num}")]
    FileNotFound { node: String, num: u64 },

    /// The stored file name does not encode an object location
    #[error("Invalid file location {name}: {reason}")]
    InvalidLocation { name: String, reason: String },

    /// The resolver itself failed
    #[error("File lookup failed for {node}-{num}: {reason}")]
    Lookup {
        node: String,
        num: u64,
        reason: String,
    },
}

/// Errors raised while fetching and decompressing blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The object is missing or the store is unreachable
    #[error("pcap file no longer available, only index data remains ({bucket}/{key}: {reason})")]
    Unavailable {
        bucket: String,
        key: String,
        reason: String,
    },

    /// The ranged GET did not complete in time
    #[error("pcap file no longer available, only index data remains ({bucket}/{key}: GET timed out after {timeout_ms} ms)")]
    Timeout {
        bucket: String,
        key: String,
        timeout_ms: u64,
    },

    /// A block could not be decompressed
    #[error("Failed to decompress block at offset {offset} of {file}: {reason}")]
    Decompression {
        file: String,
        offset: u64,
        reason: String,
    },

    /// The store returned less data than the range needed
    #[error("pcap file no longer available, only index data remains ({file}: no data for block at offset {offset})")]
    MissingBlock { file: String, offset: u64 },

    /// The fetch task ended without producing a result
    #[error("Fetch of {key} did not complete: {reason}")]
    Interrupted { key: String, reason: String },
}

/// Errors related to pcap data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PcapError {
    /// Invalid global header
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// A record runs past the end of its window
    #[error("Truncated record for item {item_pos}: expected {expected} bytes, got {actual}")]
    TruncatedRecord {
        item_pos: usize,
        expected: usize,
        actual: usize,
    },

    /// A record header carries an implausible captured length
    #[error("Record for item {item_pos} has invalid captured length {cap_len}")]
    InvalidCapLen { item_pos: usize, cap_len: u32 },
}

/// Errors reported by an object store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// No store can be built for this location
    #[error("unsupported object store scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// Any other request failure
    #[error("object store request failed: {0}")]
    Request(String),
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound { path },
            other => StoreError::Request(other.to_string()),
        }
    }
}

/// Failure reported by a file index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("file index error: {0}")]
pub struct IndexError(pub String);

/// Why the expiry worker could not expire a file.
#[derive(Error, Debug, Clone)]
pub enum ExpireError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_errors_mention_missing_pcap() {
        let unavailable = FetchError::Unavailable {
            bucket: "b".into(),
            key: "k".into(),
            reason: "connection refused".into(),
        };
        let timeout = FetchError::Timeout {
            bucket: "b".into(),
            key: "k".into(),
            timeout_ms: 10,
        };

        let missing = FetchError::MissingBlock {
            file: "s3://us-east-1/pcaps/node1/5.pcap.gz".into(),
            offset: 200000,
        };

        for err in [unavailable, timeout, missing] {
            let msg = Error::from(err).to_string();
            assert!(msg.contains("no longer available"), "{msg}");
        }
    }

    #[test]
    fn test_object_store_not_found_maps() {
        let err = object_store::Error::NotFound {
            path: "node1/1.pcap".into(),
            source: "missing".into(),
        };
        assert_eq!(
            StoreError::from(err),
            StoreError::NotFound {
                path: "node1/1.pcap".into()
            }
        );
    }

    #[test]
    fn test_expire_error_keeps_source_message() {
        let err = ExpireError::from(StoreError::Request("throttled".into()));
        assert_eq!(err.to_string(), "object store request failed: throttled");

        let err = ExpireError::from(IndexError("locked".into()));
        assert_eq!(err.to_string(), "file index error: locked");
    }
}
