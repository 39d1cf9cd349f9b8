//! Object store access.
//!
//! [`ObjectStoreClient`] is the seam the read path fetches through: ranged
//! GETs for blocks and headers, and deletes for the expiry worker.
//! [`CloudObjectStore`] implements it on the `object_store` crate.
//!
//! ## Supported Providers
//!
//! - AWS S3 (`s3://region/bucket/key`) - requires `s3` feature
//! - S3-compatible (MinIO, R2, LocalStack) - requires `s3` feature + custom endpoint
//! - Any `Arc<dyn ObjectStore>` injected with [`CloudObjectStore::with_store`]

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::io::ObjectLocation;

/// Remote store holding archived pcap objects.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Fetch `range` of the object. A range ending past the end of the
    /// object is clamped to the object size.
    async fn get_range(
        &self,
        location: &ObjectLocation,
        range: Range<u64>,
    ) -> Result<Bytes, StoreError>;

    /// Delete the object.
    async fn delete(&self, location: &ObjectLocation) -> Result<(), StoreError>;
}

/// Connection settings for [`CloudObjectStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Custom endpoint override (for S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Use anonymous (unsigned) requests
    #[serde(default)]
    pub anonymous: bool,
}

impl StoreConfig {
    /// Set a custom endpoint URL (for MinIO, R2, LocalStack, etc.).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use anonymous (unsigned) requests for public buckets.
    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }
}

/// [`ObjectStoreClient`] backed by the `object_store` crate.
///
/// One store is built per `(scheme, region, bucket)` on first use and reused.
pub struct CloudObjectStore {
    config: StoreConfig,
    stores: Mutex<HashMap<(String, String, String), Arc<dyn ObjectStore>>>,
    fixed: Option<Arc<dyn ObjectStore>>,
}

impl CloudObjectStore {
    /// Create a client that builds stores from each location.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
            fixed: None,
        }
    }

    /// Create a client that sends every request to `store`, whatever the
    /// location's bucket (e.g. `object_store::memory::InMemory` in tests).
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: StoreConfig::default(),
            stores: Mutex::new(HashMap::new()),
            fixed: Some(store),
        }
    }

    fn store_for(&self, location: &ObjectLocation) -> Result<Arc<dyn ObjectStore>, StoreError> {
        if let Some(store) = &self.fixed {
            return Ok(Arc::clone(store));
        }

        let cache_key = (
            location.scheme().to_string(),
            location.region().to_string(),
            location.bucket().to_string(),
        );

        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&cache_key) {
            return Ok(Arc::clone(store));
        }

        let store = self.build_store(location)?;
        stores.insert(cache_key, Arc::clone(&store));
        Ok(store)
    }

    /// Build an ObjectStore for this location.
    fn build_store(&self, location: &ObjectLocation) -> Result<Arc<dyn ObjectStore>, StoreError> {
        match location.scheme() {
            #[cfg(feature = "s3")]
            "s3" => self.build_s3_store(location),
            scheme => Err(StoreError::UnsupportedScheme {
                scheme: scheme.to_string(),
            }),
        }
    }

    #[cfg(feature = "s3")]
    fn build_s3_store(&self, location: &ObjectLocation) -> Result<Arc<dyn ObjectStore>, StoreError> {
        use object_store::aws::AmazonS3Builder;

        tracing::debug!(
            region = location.region(),
            bucket = location.bucket(),
            endpoint = ?self.config.endpoint,
            "Building S3 store"
        );

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(location.bucket());

        if !location.region().is_empty() {
            builder = builder.with_region(location.region());
        }

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        if self.config.anonymous {
            builder = builder.with_skip_signature(true);
        }

        let store = builder
            .build()
            .map_err(|e| StoreError::Request(format!("Failed to build S3 store: {e}")))?;

        Ok(Arc::new(store))
    }
}

#[async_trait]
impl ObjectStoreClient for CloudObjectStore {
    async fn get_range(
        &self,
        location: &ObjectLocation,
        range: Range<u64>,
    ) -> Result<Bytes, StoreError> {
        let store = self.store_for(location)?;
        let range = range.start as usize..range.end as usize;
        Ok(store.get_range(&location.object_path(), range).await?)
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StoreError> {
        let store = self.store_for(location)?;
        store.delete(&location.object_path()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for CloudObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudObjectStore")
            .field("config", &self.config)
            .field("stores", &self.stores.lock().len())
            .field("fixed", &self.fixed.is_some())
            .finish()
    }
}
