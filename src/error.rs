//! Error types for pcapvault.

use thiserror::Error;

/// Main error type for pcapvault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the read path
    #[error("{0}")]
    Core(#[from] pcapvault_core::Error),

    /// Error loading or updating the file catalog
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error loading the configuration file
    #[error("Invalid config {path}: {reason}")]
    Config { path: String, reason: String },

    /// Error reading a session record
    #[error("Invalid session {path}: {reason}")]
    Session { path: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the JSON file catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog file could not be read
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    /// The catalog file is not valid JSON
    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// The catalog could not be written back
    #[error("cannot write {path}: {reason}")]
    Persist { path: String, reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_passes_message_through() {
        let err: Error = pcapvault_core::Error::Fetch(pcapvault_core::FetchError::Unavailable {
            bucket: "b".into(),
            key: "k".into(),
            reason: "gone".into(),
        })
        .into();
        assert!(err.to_string().starts_with("pcap file no longer available"));
    }

    #[test]
    fn test_catalog_error_display() {
        let err = Error::from(CatalogError::Parse {
            path: "catalog.json".into(),
            reason: "expected value".into(),
        });
        assert_eq!(
            err.to_string(),
            "Catalog error: cannot parse catalog.json: expected value"
        );
    }
}
