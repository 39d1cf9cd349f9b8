//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::OutputFormat;

/// Reconstruct pcap sessions from archived captures in object storage.
#[derive(Parser, Debug)]
#[command(name = "pcapvault")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// JSON config file (engine and store settings)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// JSON catalog of archived files
    #[arg(long = "catalog", value_name = "FILE", global = true, default_value = "catalog.json")]
    pub catalog: PathBuf,

    /// Custom object store endpoint (MinIO, LocalStack, ...)
    #[arg(long = "endpoint", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Send unsigned requests (public buckets)
    #[arg(long = "anonymous", global = true)]
    pub anonymous: bool,

    /// Blocks kept in the decompressed block cache
    #[arg(long = "cache-capacity", value_name = "BLOCKS", global = true)]
    pub cache_capacity: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a session's packets to a pcap file
    Fetch {
        /// Session record (JSON)
        #[arg(value_name = "SESSION")]
        session: PathBuf,

        /// Output pcap file
        #[arg(short = 'o', long = "output", value_name = "PCAP")]
        output: PathBuf,

        /// Byte ranges fetched at once
        #[arg(short = 'j', long = "concurrency", default_value = "1")]
        concurrency: usize,

        /// Only read the first N packet positions
        #[arg(long = "max-packets", value_name = "N")]
        max_packets: Option<usize>,

        /// Write packets as soon as they arrive instead of in session order
        #[arg(long = "unordered")]
        unordered: bool,
    },

    /// Print the byte ranges a session would fetch
    Plan {
        /// Session record (JSON)
        #[arg(value_name = "SESSION")]
        session: PathBuf,

        /// Only read the first N packet positions
        #[arg(long = "max-packets", value_name = "N")]
        max_packets: Option<usize>,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete archived files older than the retention window
    Expire {
        /// Retention window in days
        #[arg(long = "retention-days", default_value = "30")]
        retention_days: u32,

        /// Keep running, one pass every SECS seconds, until Ctrl-C
        #[arg(long = "every", value_name = "SECS")]
        every: Option<u64>,
    },
}
