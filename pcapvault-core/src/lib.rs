//! # pcapvault-core
//!
//! Read path for block-compressed pcap archives in object storage.
//!
//! Sessions recorded by a capture node reference their packets as byte
//! offsets into pcap files that were later uploaded, often gzip or zstd
//! compressed in independently decodable blocks. This crate turns a
//! session's packet position list back into pcap records with as few
//! ranged GETs as possible.
//!
//! ## Features
//!
//! - **Range Planning**: Block-aligned descriptors for compressed files,
//!   exact spans for raw files, nearby packets coalesced into one GET
//! - **Block Cache**: LRU of decompressed blocks shared by every session
//! - **Fetch Deduplication**: At most one outstanding GET per block; failures
//!   reach every waiter
//! - **Ordered Delivery**: Bounded fan-out with packets re-sequenced by item
//!   position
//! - **Expiry**: Retention-based deletion of archived files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pcapvault_core::prelude::*;
//!
//! # async fn example() -> pcapvault_core::Result<()> {
//! let resolver = Arc::new(StaticResolver::new());
//! resolver.insert(
//!     "node1",
//!     FileInfo::new(5, "s3://us-east-1/pcaps/node1/5.pcap.gz", 100000)?,
//! );
//!
//! let store = Arc::new(CloudObjectStore::new(StoreConfig::default()));
//! let reader = SessionReader::new(EngineConfig::default(), store, resolver);
//!
//! let session = Session::new("node1", vec![-5, 1000, 1500]);
//! let mut sink = PacketCollector::new();
//! let outcome = reader
//!     .process_session(session, &mut sink, ProcessOptions::default())
//!     .await;
//!
//! println!("{} packets, error: {:?}", sink.packets.len(), outcome.error);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pcapvault-core                               |
//! +---------------------------------------------------------------------+
//! |  session/  - Session records, packetPos decoding (absolute, gap0)   |
//! |  resolve/  - FileInfo, FileResolver trait                           |
//! |  plan/     - ByteRangePlanner, PacketDescriptor, coalescing         |
//! |  cache/    - BlockKey, BlockCache trait, LRU block cache            |
//! |  fetch/    - FetchCoordinator (single-flight GETs)                  |
//! |  io/       - ObjectLocation, ObjectStoreClient, decompression       |
//! |  pcap/     - Global header, record extraction                       |
//! |  reader/   - SessionReader, SessionSink                             |
//! |  expire/   - ExpiryWorker, FileIndex trait                          |
//! |  error/    - Error types                                            |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Crate Features
//!
//! - `default` - S3 support enabled
//! - `s3` - Build Amazon S3 stores for `s3://` locations

pub mod cache;
pub mod config;
pub mod error;
pub mod expire;
pub mod fetch;
pub mod io;
pub mod pcap;
pub mod plan;
pub mod prelude;
pub mod reader;
pub mod resolve;
pub mod session;

// Re-export commonly used types at crate root for convenience
pub use cache::{BlockCache, BlockKey, CacheStats, LruBlockCache};
pub use config::EngineConfig;
pub use error::{
    Error, ExpireError, FetchError, IndexError, LocateError, PcapError, PlanError, Result, StoreError,
};
pub use expire::{ArchivedFile, ExpiryReport, ExpiryWorker, FileIndex};
pub use fetch::{BlockSet, CoordinatorStats, FetchCoordinator, FetchSource};
pub use io::{
    decompress_header, CloudObjectStore, Compression, Decompressor, ObjectLocation,
    ObjectStoreClient, StoreConfig,
};
pub use pcap::{PacketAssembler, PcapFormat, PcapHandle, PCAP_HEADER_LEN, RECORD_HEADER_LEN};
pub use plan::{ByteRangePlanner, PacketDescriptor, PlannerConfig, SubPacket};
pub use reader::{
    DeliveryOrder, PacketCollector, ProcessOptions, SessionOutcome, SessionReader, SessionSink,
    SessionStats,
};
pub use resolve::{FileInfo, FileResolver, StaticResolver};
pub use session::{PosEncoding, Positions, Session};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
