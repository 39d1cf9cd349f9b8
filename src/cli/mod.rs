//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Config file loading and flag overrides
//! - Plan output formatting (table, JSON)
//! - Writing fetched sessions as pcap files

mod args;
mod config;
mod output;
mod pcap_writer;

pub use args::{Args, Command};
pub use config::AppConfig;
pub use output::{OutputFormat, PlanFormatter};
pub use pcap_writer::PcapFileSink;
