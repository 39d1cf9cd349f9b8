//! In-flight fetch deduplication.
//!
//! [`FetchCoordinator`] guarantees at most one outstanding fetch+decompress
//! per [`BlockKey`]. The first requester registers a shared future; later
//! requesters for the same key await that future instead of issuing their
//! own GET. When the fetch resolves, every produced block is written to the
//! cache, the registry entry is removed, and all waiters observe the same
//! result, success or failure. Each fetch runs on its own tokio task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::cache::{BlockCache, BlockKey};
use crate::error::FetchError;

/// Blocks produced by one fetch, each under its own cache key.
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    blocks: Vec<(BlockKey, Bytes)>,
}

impl BlockSet {
    pub fn new(blocks: Vec<(BlockKey, Bytes)>) -> Self {
        Self { blocks }
    }

    /// A set holding exactly one block.
    pub fn single(key: BlockKey, block: Bytes) -> Self {
        Self {
            blocks: vec![(key, block)],
        }
    }

    pub fn get(&self, key: &BlockKey) -> Option<&Bytes> {
        self.blocks.iter().find(|(k, _)| k == key).map(|(_, b)| b)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &Bytes)> {
        self.blocks.iter().map(|(k, b)| (k, b))
    }
}

/// Where the blocks handed to a caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Served from the cache, no fetch involved
    Cache,
    /// This caller started the fetch
    Fetched,
    /// This caller joined a fetch already in flight
    Joined,
}

/// Counters for coordinator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Fetches started
    pub started: u64,
    /// Requests that waited on a fetch someone else started
    pub joined: u64,
    /// Fetches that failed
    pub failed: u64,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<BlockSet>, FetchError>>>;

/// Single-flight fetch registry in front of a [`BlockCache`].
pub struct FetchCoordinator {
    cache: Arc<dyn BlockCache>,
    inflight: Arc<Mutex<HashMap<BlockKey, SharedFetch>>>,
    started: AtomicU64,
    joined: AtomicU64,
    failed: Arc<AtomicU64>,
}

impl FetchCoordinator {
    pub fn new(cache: Arc<dyn BlockCache>) -> Self {
        Self {
            cache,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The cache this coordinator fills.
    pub fn cache(&self) -> &Arc<dyn BlockCache> {
        &self.cache
    }

    /// Number of fetches currently registered.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Return the blocks for `key`, from the cache, from a fetch already in
    /// flight, or from a new fetch.
    ///
    /// `cached` decides whether the cache can satisfy the request; it runs
    /// under the registry lock, so checking the cache, checking the
    /// registry and registering a new fetch happen atomically. `fetch`
    /// is only called when a new fetch is registered. On success every
    /// block it produced is cached before any waiter wakes.
    ///
    /// The fetch runs on its own task, so it completes and leaves the
    /// registry even when every caller waiting on it is cancelled.
    ///
    /// The joined result belongs to whichever request registered the key;
    /// callers that need more than that check the set and ask again.
    pub async fn get_or_fetch<P, F, Fut>(
        &self,
        key: BlockKey,
        cached: P,
        fetch: F,
    ) -> Result<(Arc<BlockSet>, FetchSource), FetchError>
    where
        P: FnOnce(&dyn BlockCache) -> Option<BlockSet>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BlockSet, FetchError>> + Send + 'static,
    {
        let (shared, source) = {
            let mut inflight = self.inflight.lock();

            if let Some(blocks) = cached(self.cache.as_ref()) {
                return Ok((Arc::new(blocks), FetchSource::Cache));
            }

            match inflight.get(&key) {
                Some(existing) => {
                    self.joined.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Joining in-flight fetch");
                    (existing.clone(), FetchSource::Joined)
                }
                None => {
                    self.started.fetch_add(1, Ordering::Relaxed);
                    let shared = self.register(key.clone(), fetch());
                    inflight.insert(key, shared.clone());
                    (shared, FetchSource::Fetched)
                }
            }
        };

        shared.await.map(|blocks| (blocks, source))
    }

    fn register<Fut>(&self, key: BlockKey, fetch: Fut) -> SharedFetch
    where
        Fut: Future<Output = Result<BlockSet, FetchError>> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.inflight);
        let failed = Arc::clone(&self.failed);
        let task_registry = Arc::clone(&self.inflight);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let result = fetch.await.map(Arc::new);

            match &result {
                Ok(blocks) => {
                    for (block_key, block) in blocks.iter() {
                        cache.put(block_key.clone(), block.clone());
                    }
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %task_key, error = %e, "Fetch failed");
                }
            }

            task_registry.lock().remove(&task_key);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before unregistering
                    registry.lock().remove(&key);
                    Err(FetchError::Interrupted {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.in_flight())
            .field("stats", &self.stats())
            .finish()
    }
}
