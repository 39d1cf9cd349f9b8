//! Bounded LRU block cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use super::{BlockCache, BlockKey, CacheStats};

/// LRU block cache with a fixed entry limit.
///
/// Thread-safe implementation using RwLock for the entries
/// and atomics for statistics.
pub struct LruBlockCache {
    /// Maximum number of blocks to cache
    max_entries: usize,

    /// Cached blocks: key -> (bytes, last_access_order)
    entries: RwLock<HashMap<BlockKey, (Bytes, u64)>>,

    /// Monotonically increasing access counter for LRU ordering
    access_counter: AtomicU64,

    /// Statistics
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    /// Peak entries ever held (high watermark)
    peak_entries: AtomicUsize,
    /// Bytes held by cached blocks
    resident_bytes: AtomicUsize,
}

impl LruBlockCache {
    /// Create a new cache holding at most `max_entries` blocks.
    ///
    /// A capacity of zero caches nothing.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: RwLock::new(HashMap::with_capacity(max_entries.min(10_000))),
            access_counter: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            peak_entries: AtomicUsize::new(0),
            resident_bytes: AtomicUsize::new(0),
        }
    }

    /// Evict least recently used entries down to `target_size`.
    fn evict_lru(&self, entries: &mut HashMap<BlockKey, (Bytes, u64)>, target_size: usize) {
        if entries.len() <= target_size {
            return;
        }

        let to_remove = entries.len() - target_size;

        let mut access_orders: Vec<_> = entries
            .iter()
            .map(|(key, (_, order))| (key.clone(), *order))
            .collect();
        access_orders.sort_by_key(|(_, order)| *order);

        for (key, _) in access_orders.into_iter().take(to_remove) {
            if let Some((block, _)) = entries.remove(&key) {
                self.resident_bytes.fetch_sub(block.len(), Ordering::Relaxed);
                tracing::trace!(key = %key, "Evicted block");
            }
        }

        self.evictions.fetch_add(to_remove as u64, Ordering::Relaxed);
    }

    /// Update peak entries if current is higher.
    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_entries.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_entries.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }

    /// Get current cache statistics.
    pub fn get_stats(&self) -> CacheStats {
        let entries = self.entries.read();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            max_entries: self.max_entries,
            evictions: self.evictions.load(Ordering::Relaxed),
            peak_entries: self.peak_entries.load(Ordering::Relaxed),
            resident_bytes: self.resident_bytes.load(Ordering::Relaxed),
        }
    }

    /// Check whether `key` is cached without touching LRU order or stats.
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl BlockCache for LruBlockCache {
    fn get(&self, key: &BlockKey) -> Option<Bytes> {
        let mut entries = self.entries.write();

        if let Some((block, access_order)) = entries.get_mut(key) {
            *access_order = self.access_counter.fetch_add(1, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, size = block.len(), "Cache hit");
            Some(block.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache miss");
            None
        }
    }

    fn put(&self, key: BlockKey, block: Bytes) {
        if self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.write();
        let access_order = self.access_counter.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = entries.get_mut(&key) {
            self.resident_bytes.fetch_sub(entry.0.len(), Ordering::Relaxed);
            self.resident_bytes.fetch_add(block.len(), Ordering::Relaxed);
            *entry = (block, access_order);
            return;
        }

        if entries.len() >= self.max_entries {
            self.evict_lru(&mut entries, self.max_entries - 1);
        }

        self.resident_bytes.fetch_add(block.len(), Ordering::Relaxed);
        entries.insert(key, (block, access_order));

        // Update peak after insertion
        self.update_peak(entries.len());
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.get_stats())
    }
}

impl std::fmt::Debug for LruBlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.get_stats();
        f.debug_struct("LruBlockCache")
            .field("max_entries", &self.max_entries)
            .field("entries", &stats.entries)
            .field("hits", &stats.hits)
            .field("misses", &stats.misses)
            .field("hit_ratio", &format!("{:.2}%", stats.hit_ratio() * 100.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(offset: u64) -> BlockKey {
        BlockKey::data("bucket", "node1/1.pcap.gz", offset)
    }

    fn block(len: usize) -> Bytes {
        Bytes::from(vec![0xab; len])
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = LruBlockCache::new(100);

        // Miss on empty cache
        assert!(cache.get(&key(0)).is_none());
        assert_eq!(cache.get_stats().misses, 1);

        cache.put(key(0), block(10));

        assert_eq!(cache.get(&key(0)).unwrap().len(), 10);
        assert_eq!(cache.get_stats().hits, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = LruBlockCache::new(3);

        for i in 0..3 {
            cache.put(key(i), block(1));
        }

        // Touch block 0 so block 1 becomes the oldest
        let _ = cache.get(&key(0));

        cache.put(key(3), block(1));

        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));

        let stats = cache.get_stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.peak_entries, 3);
    }

    #[test]
    fn test_replace_updates_bytes() {
        let cache = LruBlockCache::new(10);

        cache.put(key(0), block(100));
        cache.put(key(0), block(40));

        let stats = cache.get_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.resident_bytes, 40);
        assert_eq!(cache.get(&key(0)).unwrap().len(), 40);
    }

    #[test]
    fn test_header_and_data_keys_are_distinct() {
        let cache = LruBlockCache::new(10);

        cache.put(BlockKey::header("node1", -1), block(24));
        cache.put(key(0), block(1000));

        assert_eq!(cache.get(&BlockKey::header("node1", -1)).unwrap().len(), 24);
        assert!(cache.get(&BlockKey::header("node2", -1)).is_none());
        assert_eq!(cache.get_stats().resident_bytes, 1024);
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let cache = LruBlockCache::new(0);
        cache.put(key(0), block(1));
        assert!(cache.get(&key(0)).is_none());
        assert_eq!(cache.get_stats().entries, 0);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LruBlockCache::new(1000));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let k = key(t * 1000 + i);
                        cache.put(k.clone(), block(8));
                        assert!(cache.get(&k).is_some());
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.get_stats().entries, 400);
        assert_eq!(cache.get_stats().resident_bytes, 3200);
    }
}
