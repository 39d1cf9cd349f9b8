//! Block cache for avoiding redundant fetches and decompression.
//!
//! Sessions recorded close together in time point into the same compressed
//! blocks. Without caching, each session would GET and inflate the same
//! block again.
//!
//! The cache stores decompressed blocks keyed by [`BlockKey`]: body blocks
//! by `(bucket, key, range start)` and global headers by `(node, marker)`.
//! Entries live until LRU eviction; there is no TTL.

mod lru;

pub use lru::LruBlockCache;

use std::fmt;

use bytes::Bytes;

/// Cache key for a decompressed block or a global pcap header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKey {
    /// Body block starting at `offset` in `bucket/key`
    Data {
        bucket: String,
        key: String,
        offset: u64,
    },
    /// 24-byte global header of the file behind `marker` on `node`
    Header { node: String, marker: i64 },
}

impl BlockKey {
    /// Key for a body block.
    pub fn data(bucket: &str, key: &str, offset: u64) -> Self {
        BlockKey::Data {
            bucket: bucket.to_string(),
            key: key.to_string(),
            offset,
        }
    }

    /// Key for a file's global header.
    pub fn header(node: &str, marker: i64) -> Self {
        BlockKey::Header {
            node: node.to_string(),
            marker,
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKey::Data {
                bucket,
                key,
                offset,
            } => write!(f, "data:{bucket}:{key}:{offset}"),
            BlockKey::Header { node, marker } => write!(f, "pcap:{node}:{marker}"),
        }
    }
}

/// Cache for decompressed blocks.
///
/// Implementations must be thread-safe as many sessions share one cache.
pub trait BlockCache: Send + Sync {
    /// Get a cached block, marking it recently used.
    fn get(&self, key: &BlockKey) -> Option<Bytes>;

    /// Store a block, replacing any previous bytes for the key.
    fn put(&self, key: BlockKey, block: Bytes);

    /// Get cache statistics (if available).
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Cache statistics for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Current number of cached blocks.
    pub entries: usize,
    /// Maximum number of blocks allowed.
    pub max_entries: usize,
    /// Number of blocks evicted due to LRU policy.
    pub evictions: u64,
    /// Peak number of entries ever held (high watermark).
    pub peak_entries: usize,
    /// Bytes currently held by cached blocks.
    pub resident_bytes: usize,
}

impl CacheStats {
    /// Calculate the hit ratio (hits / total accesses).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate cache utilization (entries / max_entries).
    pub fn utilization(&self) -> f64 {
        if self.max_entries == 0 {
            0.0
        } else {
            self.entries as f64 / self.max_entries as f64
        }
    }

    /// Format statistics as a human-readable string.
    pub fn format_summary(&self) -> String {
        let hit_pct = self.hit_ratio() * 100.0;
        let miss_pct = 100.0 - hit_pct;
        let util_pct = self.utilization() * 100.0;

        format!(
            "Block Cache Statistics:\n\
             \x20 Hits:        {:>10} ({:.1}%)\n\
             \x20 Misses:      {:>10} ({:.1}%)\n\
             \x20 Entries:     {:>10} / {} ({:.1}%)\n\
             \x20 Peak:        {:>10}\n\
             \x20 Evictions:   {:>10}\n\
             \x20 Memory:      {:>10}",
            self.hits, hit_pct,
            self.misses, miss_pct,
            self.entries, self.max_entries, util_pct,
            self.peak_entries,
            self.evictions,
            format_bytes(self.resident_bytes),
        )
    }
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(
            BlockKey::data("arkime", "node1/1.pcap.gz", 200000).to_string(),
            "data:arkime:node1/1.pcap.gz:200000"
        );
        assert_eq!(BlockKey::header("node1", -5).to_string(), "pcap:node1:-5");
    }

    #[test]
    fn test_cache_stats_hit_ratio() {
        let stats = CacheStats {
            hits: 75,
            misses: 25,
            entries: 10,
            max_entries: 100,
            ..Default::default()
        };

        assert!((stats.hit_ratio() - 0.75).abs() < 0.001);
        assert!((stats.utilization() - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_cache_stats_empty() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);
        assert_eq!(stats.utilization(), 0.0);
    }

    #[test]
    fn test_format_summary() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entries: 2,
            max_entries: 100,
            evictions: 0,
            peak_entries: 2,
            resident_bytes: 200_000,
        };
        let summary = stats.format_summary();
        assert!(summary.contains("75.0%"));
        assert!(summary.contains("195.31 KB"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
