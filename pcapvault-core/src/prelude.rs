//! Convenient re-exports for common usage.
//!
//! ```rust,no_run
//! use pcapvault_core::prelude::*;
//!
//! let config = EngineConfig::default().with_cache_capacity(500);
//! let options = ProcessOptions::default().with_concurrency(4);
//! ```

// Session types
pub use crate::session::Session;

// Reading
pub use crate::reader::{
    DeliveryOrder, PacketCollector, ProcessOptions, SessionOutcome, SessionReader, SessionSink,
};

// File metadata and storage
pub use crate::io::{CloudObjectStore, ObjectStoreClient, StoreConfig};
pub use crate::resolve::{FileInfo, FileResolver, StaticResolver};

// Cache types
pub use crate::cache::{BlockCache, LruBlockCache};

// Configuration
pub use crate::config::EngineConfig;

// Error types
pub use crate::error::{Error, Result};
