//! pcapvault - Reconstruct pcap sessions from archived captures.
//!
//! This library wires the `pcapvault-core` read path to a JSON file
//! catalog and provides the pieces of the `pcapvault` command-line tool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pcapvault::catalog::JsonCatalog;
//! use pcapvault::cli::PcapFileSink;
//! use pcapvault_core::{CloudObjectStore, EngineConfig, ProcessOptions, Session, SessionReader, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Arc::new(JsonCatalog::load("catalog.json").await?);
//!     let store = Arc::new(CloudObjectStore::new(StoreConfig::default()));
//!     let reader = SessionReader::new(EngineConfig::default(), store, catalog);
//!
//!     let session = Session::new("node1", vec![-5, 1000, 1500]);
//!     let mut sink = PcapFileSink::new(std::fs::File::create("session.pcap")?);
//!     reader.process_session(session, &mut sink, ProcessOptions::default()).await;
//!     sink.finish()?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod error;

pub use error::{Error, Result};
