//! Engine configuration.
//!
//! [`EngineConfig`] holds the read-path tunables. Every field has a default,
//! so a config file only needs to name what it overrides:
//!
//! ```json
//! { "cache_capacity": 500, "get_timeout_ms": 5000 }
//! ```
//!
//! - **cache_capacity**: decompressed blocks kept in the LRU (default: 100)
//! - **coalesce_slack**: bytes past a range end that still join it (default: 32 KiB)
//! - **default_packet_len**: over-fetch when a packet length is unknown (default: 65536)
//! - **header_fetch_len**: prefix fetched to decode the global header (default: 128)
//! - **get_timeout_ms**: bound on each ranged GET (default: 30 s)
//! - **max_block_output**: inflated bytes allowed per block (default: 16 MiB)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::plan::PlannerConfig;

/// Read-path configuration shared by every session of a [`SessionReader`](crate::SessionReader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of cached blocks
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Coalescing window past the previous range end
    #[serde(default = "default_coalesce_slack")]
    pub coalesce_slack: u64,

    /// Bytes fetched for a packet whose length is unknown
    #[serde(default = "default_packet_len")]
    pub default_packet_len: u64,

    /// Length of the ranged GET used to read the global header
    #[serde(default = "default_header_fetch_len")]
    pub header_fetch_len: u64,

    /// Timeout applied to every ranged GET, in milliseconds
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,

    /// Upper bound on the decompressed size of one block
    #[serde(default = "default_max_block_output")]
    pub max_block_output: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            coalesce_slack: default_coalesce_slack(),
            default_packet_len: default_packet_len(),
            header_fetch_len: default_header_fetch_len(),
            get_timeout_ms: default_get_timeout_ms(),
            max_block_output: default_max_block_output(),
        }
    }
}

impl EngineConfig {
    /// Set the number of cached blocks.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the coalescing slack in bytes.
    pub fn with_coalesce_slack(mut self, slack: u64) -> Self {
        self.coalesce_slack = slack;
        self
    }

    /// Set the fallback packet length.
    pub fn with_default_packet_len(mut self, len: u64) -> Self {
        self.default_packet_len = len;
        self
    }

    /// Set the header prefix length.
    pub fn with_header_fetch_len(mut self, len: u64) -> Self {
        self.header_fetch_len = len;
        self
    }

    /// Set the per-GET timeout.
    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Set the per-block decompression limit.
    pub fn with_max_block_output(mut self, limit: usize) -> Self {
        self.max_block_output = limit;
        self
    }

    /// Per-GET timeout as a [`Duration`].
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    /// The subset of settings the planner needs.
    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            coalesce_slack: self.coalesce_slack,
            default_packet_len: self.default_packet_len,
        }
    }
}

fn default_cache_capacity() -> usize {
    100
}

fn default_coalesce_slack() -> u64 {
    32 * 1024
}

fn default_packet_len() -> u64 {
    65536
}

fn default_header_fetch_len() -> u64 {
    128
}

fn default_get_timeout_ms() -> u64 {
    30_000
}

fn default_max_block_output() -> usize {
    16 * 1024 * 1024 // 16MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.coalesce_slack, 32768);
        assert_eq!(config.default_packet_len, 65536);
        assert_eq!(config.header_fetch_len, 128);
        assert_eq!(config.get_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"cache_capacity": 7, "get_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.cache_capacity, 7);
        assert_eq!(config.get_timeout(), Duration::from_millis(250));
        assert_eq!(config.coalesce_slack, 32768);
        assert_eq!(config.max_block_output, 16 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_cache_capacity(3)
            .with_coalesce_slack(0)
            .with_default_packet_len(2048)
            .with_get_timeout(Duration::from_millis(1500));

        let planner = config.planner();
        assert_eq!(config.cache_capacity, 3);
        assert_eq!(planner.coalesce_slack, 0);
        assert_eq!(planner.default_packet_len, 2048);
        assert_eq!(config.get_timeout_ms, 1500);
    }
}
