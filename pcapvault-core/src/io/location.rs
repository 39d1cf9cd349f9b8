//! Object locations encoded in stored file names.
//!
//! The index stores each archived file under a name such as
//! `s3://us-east-1/arkime-pcap/node1/000042-230101-1.pcap.gz`. The name is
//! split into at most five `/`-delimited segments: scheme, an empty
//! segment, region, bucket, and the key (which may contain further `/`).

use std::fmt;

use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};

use crate::error::LocateError;

/// Parsed object-store location of an archived pcap file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    scheme: String,
    region: String,
    bucket: String,
    key: String,
}

impl ObjectLocation {
    /// Build a location from its parts.
    pub fn new(
        scheme: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            region: region.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a stored file name.
    ///
    /// Supported format: `scheme://region/bucket/key...`
    pub fn parse(name: &str) -> Result<Self, LocateError> {
        let invalid = |reason: &str| LocateError::InvalidLocation {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = name.splitn(5, '/').collect();
        let [scheme, empty, region, bucket, key] = parts.as_slice() else {
            return Err(invalid("expected scheme://region/bucket/key"));
        };

        let scheme = scheme
            .strip_suffix(':')
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("missing scheme"))?;
        if !empty.is_empty() {
            return Err(invalid("expected '//' after scheme"));
        }
        if bucket.is_empty() {
            return Err(invalid("missing bucket"));
        }
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }

        Ok(Self::new(scheme, *region, *bucket, *key))
    }

    /// Get the URL scheme (e.g. `s3`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the region segment (may be empty).
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the object path for this location.
    pub fn object_path(&self) -> ObjectPath {
        ObjectPath::from(self.key.as_str())
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.scheme, self.region, self.bucket, self.key
        )
    }
}
