//! Session orchestration.
//!
//! [`SessionReader`] drives one session through the read path:
//!
//! ```text
//! Session ──► decode positions ──► resolve files ──► plan descriptors
//!                                                        │
//!          ┌──────────── bounded fan-out ◄───────────────┘
//!          ▼
//!   header (cache / short GET) ──► windows (cache / coordinated GET + inflate)
//!          │
//!          ▼
//!   assemble records ──► re-sequence by item position ──► SessionSink
//! ```
//!
//! A failed descriptor does not stop the others: its packets are dropped,
//! the remaining packets are still delivered in order, and the first error
//! is reported on completion together with the untouched session.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::{try_join_all, BoxFuture};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{BlockCache, BlockKey, CacheStats, LruBlockCache};
use crate::config::EngineConfig;
use crate::error::{Error, FetchError, LocateError, PlanError, Result};
use crate::fetch::{BlockSet, FetchCoordinator, FetchSource};
use crate::io::{decompress_header, Decompressor, ObjectLocation, ObjectStoreClient};
use crate::pcap::{AssembledPacket, PacketAssembler, PcapHandle, PCAP_HEADER_LEN};
use crate::plan::{ByteRangePlanner, PacketDescriptor, SubPacket};
use crate::resolve::{FileInfo, FileResolver};
use crate::session::{Positions, Session};

/// Times a descriptor may join in-flight fetches that turn out too short
/// before giving up.
const MAX_JOIN_ATTEMPTS: usize = 4;

/// Receives a session's header, packets and completion.
pub trait SessionSink {
    /// Called once per session with the first file's global header.
    fn on_header(&mut self, handle: &PcapHandle, header: &[u8]) -> Result<()> {
        let _ = (handle, header);
        Ok(())
    }

    /// Called for every reconstructed record. Returning an error stops the
    /// session.
    fn on_packet(&mut self, handle: &PcapHandle, record: Bytes, item_pos: usize) -> Result<()>;

    /// Called once when the session is finished, with the first error if
    /// any step failed.
    fn on_complete(&mut self, error: Option<&Error>, session: &Session) {
        let _ = (error, session);
    }
}

/// Order in which packets reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryOrder {
    /// Session order (by item position)
    #[default]
    Strict,
    /// As soon as each descriptor completes
    AsCompleted,
}

/// Per-call options for [`SessionReader::process_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Descriptors processed at once (at least 1)
    pub concurrency: usize,
    pub order: DeliveryOrder,
    /// Only the first N `packetPos` entries are read
    pub max_packets: Option<usize>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            order: DeliveryOrder::Strict,
            max_packets: None,
        }
    }
}

impl ProcessOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_order(mut self, order: DeliveryOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_packets(mut self, max_packets: usize) -> Self {
        self.max_packets = Some(max_packets);
        self
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Top-level descriptors planned
    pub descriptors: usize,
    /// Descriptors whose ranged GET this session issued
    pub fetched: usize,
    /// Descriptors served by a GET another request had in flight
    pub joined: usize,
    /// Descriptors served entirely from the cache
    pub cache_served: usize,
    /// Descriptors that failed to fetch or decompress
    pub failed_descriptors: usize,
    /// Packets handed to the sink
    pub emitted: usize,
    /// Packets dropped because their record was malformed
    pub skipped: usize,
}

/// Result of [`SessionReader::process_session`].
#[derive(Debug)]
pub struct SessionOutcome {
    /// The session as it was passed in
    pub session: Session,
    pub error: Option<Error>,
    pub stats: SessionStats,
}

impl SessionOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reconstructs session packets from archived pcap files.
///
/// One reader is shared by every session; its cache and fetch coordinator
/// are what let concurrent sessions share blocks.
pub struct SessionReader {
    config: EngineConfig,
    store: Arc<dyn ObjectStoreClient>,
    resolver: Arc<dyn FileResolver>,
    coordinator: FetchCoordinator,
    decompressor: Decompressor,
    planner: ByteRangePlanner,
}

impl SessionReader {
    /// Create a reader with an LRU cache sized by `config.cache_capacity`.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ObjectStoreClient>,
        resolver: Arc<dyn FileResolver>,
    ) -> Self {
        let cache = Arc::new(LruBlockCache::new(config.cache_capacity));
        Self::with_cache(config, store, resolver, cache)
    }

    /// Create a reader around an existing cache.
    pub fn with_cache(
        config: EngineConfig,
        store: Arc<dyn ObjectStoreClient>,
        resolver: Arc<dyn FileResolver>,
        cache: Arc<dyn BlockCache>,
    ) -> Self {
        Self {
            decompressor: Decompressor::new(config.max_block_output),
            planner: ByteRangePlanner::new(config.planner()),
            coordinator: FetchCoordinator::new(cache),
            config,
            store,
            resolver,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.coordinator.cache().stats()
    }

    /// Resolve the session's files and plan its descriptors without
    /// fetching anything.
    pub async fn plan(
        &self,
        session: &Session,
        max_packets: Option<usize>,
    ) -> Result<Vec<PacketDescriptor>> {
        let positions = session.positions(max_packets)?;
        let files = self.resolve_files(&session.node, &positions).await?;
        Ok(self
            .planner
            .plan(&positions.pos, positions.len.as_deref(), &files)?)
    }

    /// Deliver every packet of `session` to `sink`, then call
    /// [`SessionSink::on_complete`].
    pub async fn process_session<S>(
        &self,
        session: Session,
        sink: &mut S,
        options: ProcessOptions,
    ) -> SessionOutcome
    where
        S: SessionSink + ?Sized,
    {
        let mut stats = SessionStats::default();
        let error = self.run(&session, sink, &options, &mut stats).await.err();

        match &error {
            None => info!(
                node = %session.node,
                id = ?session.id,
                packets = stats.emitted,
                skipped = stats.skipped,
                descriptors = stats.descriptors,
                "Session complete"
            ),
            Some(e) => warn!(
                node = %session.node,
                id = ?session.id,
                packets = stats.emitted,
                error = %e,
                "Session failed"
            ),
        }

        sink.on_complete(error.as_ref(), &session);
        SessionOutcome {
            session,
            error,
            stats,
        }
    }

    async fn run<S>(
        &self,
        session: &Session,
        sink: &mut S,
        options: &ProcessOptions,
        stats: &mut SessionStats,
    ) -> Result<()>
    where
        S: SessionSink + ?Sized,
    {
        let positions = session.positions(options.max_packets)?;
        let files = self.resolve_files(&session.node, &positions).await?;
        let descriptors = self
            .planner
            .plan(&positions.pos, positions.len.as_deref(), &files)?;
        stats.descriptors = descriptors.len();

        let node = session.node.as_str();
        let headers = HeaderMemo::default();

        if let Some(&marker) = positions.pos.iter().find(|&&p| p < 0) {
            let num = marker.unsigned_abs();
            let file = files.get(&num).ok_or(PlanError::UnresolvedFile { num })?;
            let handle = self.header_for(&headers, node, marker, file).await?;
            sink.on_header(&handle, handle.header_bytes())?;
        }

        let mut pending = stream::iter(descriptors)
            .map(|desc| self.load_descriptor(&headers, node, desc))
            .buffer_unordered(options.concurrency.max(1));

        let mut sequencer = Sequencer::new(options.order);
        let mut first_error: Option<Error> = None;

        while let Some(output) = pending.next().await {
            match output.result {
                Ok(loaded) => {
                    match loaded.source {
                        FetchSource::Cache => stats.cache_served += 1,
                        FetchSource::Fetched => stats.fetched += 1,
                        FetchSource::Joined => stats.joined += 1,
                    }
                    stats.skipped += loaded.skipped.len();
                    for packet in loaded.packets {
                        sequencer.push(
                            packet.item_pos,
                            Some((Arc::clone(&loaded.handle), packet.record)),
                        );
                    }
                    for item_pos in loaded.skipped {
                        sequencer.push(item_pos, None);
                    }
                }
                Err(e) => {
                    warn!(node, items = output.items.len(), error = %e, "Descriptor failed");
                    stats.failed_descriptors += 1;
                    for item_pos in output.items {
                        sequencer.push(item_pos, None);
                    }
                    first_error.get_or_insert(e);
                }
            }

            for (item_pos, handle, record) in sequencer.take_ready() {
                sink.on_packet(&handle, record, item_pos)?;
                stats.emitted += 1;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn resolve_files(
        &self,
        node: &str,
        positions: &Positions,
    ) -> Result<HashMap<u64, Arc<FileInfo>>> {
        let lookups = positions.file_nums().into_iter().map(|num| async move {
            match self.resolver.resolve(node, num).await? {
                Some(info) => Ok::<_, LocateError>((num, Arc::new(info))),
                None => Err(LocateError::FileNotFound {
                    node: node.to_string(),
                    num,
                }),
            }
        });

        Ok(try_join_all(lookups).await?.into_iter().collect())
    }

    async fn load_descriptor(
        &self,
        headers: &HeaderMemo,
        node: &str,
        desc: PacketDescriptor,
    ) -> DescriptorOutput {
        let result = self.try_load_descriptor(headers, node, &desc).await;
        DescriptorOutput {
            items: desc.item_positions().collect(),
            result,
        }
    }

    async fn try_load_descriptor(
        &self,
        headers: &HeaderMemo,
        node: &str,
        desc: &PacketDescriptor,
    ) -> Result<Loaded> {
        let handle = self.header_for(headers, node, desc.marker, &desc.file).await?;
        let assembler = PacketAssembler::for_handle(&handle);
        let (blocks, source) = self.load_windows(desc, assembler).await?;

        let mut packets = Vec::with_capacity(desc.sub_packets.len());
        let mut skipped = Vec::new();

        for sub in &desc.sub_packets {
            let (key, window_start) = window_for(desc, sub);
            let Some(window) = blocks.get(&key) else {
                return Err(FetchError::MissingBlock {
                    file: desc.file.name.clone(),
                    offset: key_offset(&key),
                }
                .into());
            };

            match assembler.assemble(window, window_start, sub) {
                Ok(packet) => packets.push(packet),
                Err(e) => {
                    warn!(file = %desc.file.name, item_pos = sub.item_pos, error = %e, "Skipping packet");
                    skipped.push(sub.item_pos);
                }
            }
        }

        Ok(Loaded {
            handle,
            packets,
            skipped,
            source,
        })
    }

    async fn header_for(
        &self,
        headers: &HeaderMemo,
        node: &str,
        marker: i64,
        file: &Arc<FileInfo>,
    ) -> Result<Arc<PcapHandle>> {
        let known = headers.0.lock().get(&marker).cloned();
        if let Some(handle) = known {
            return Ok(handle);
        }

        let handle = self.load_header(node, marker, file).await?;
        headers.0.lock().insert(marker, Arc::clone(&handle));
        Ok(handle)
    }

    /// Read a file's global header from the cache or with a short GET.
    async fn load_header(
        &self,
        node: &str,
        marker: i64,
        file: &Arc<FileInfo>,
    ) -> Result<Arc<PcapHandle>> {
        let key = BlockKey::header(node, marker);

        let cached = |cache: &dyn BlockCache| {
            cache
                .get(&key)
                .map(|header| BlockSet::single(key.clone(), header))
        };

        let fetch = {
            let store = Arc::clone(&self.store);
            let file = Arc::clone(file);
            let key = key.clone();
            let range = 0..self.config.header_fetch_len;
            let timeout = self.config.get_timeout();

            move || async move {
                let prefix = fetch_range(store.as_ref(), &file.location, range, timeout).await?;
                let header = decompress_header(&prefix, file.compression, PCAP_HEADER_LEN)
                    .map_err(|e| FetchError::Decompression {
                        file: file.name.clone(),
                        offset: 0,
                        reason: e.to_string(),
                    })?;
                Ok::<_, FetchError>(BlockSet::single(key, Bytes::from(header)))
            }
        };

        let (blocks, _) = self
            .coordinator
            .get_or_fetch(key.clone(), cached, fetch)
            .await?;
        let header = blocks.get(&key).cloned().unwrap_or_default();

        Ok(Arc::new(PcapHandle::parse(node, file.num, header)?))
    }

    /// Get every window a descriptor needs, from the cache when all of them
    /// are present, otherwise with one coordinated GET of the whole range.
    ///
    /// Fetches in flight are registered under their first block, so the
    /// fetch joined here may have been planned for a shorter range. Such a
    /// result is not used; the request goes back to the coordinator, which
    /// now finds the blocks that fetch cached or starts one for this range.
    async fn load_windows(
        &self,
        desc: &PacketDescriptor,
        assembler: PacketAssembler,
    ) -> std::result::Result<(Arc<BlockSet>, FetchSource), FetchError> {
        let location = &desc.file.location;
        let keys: Vec<BlockKey> = desc
            .window_starts()
            .into_iter()
            .map(|start| BlockKey::data(location.bucket(), location.key(), start))
            .collect();
        let lead = BlockKey::data(location.bucket(), location.key(), desc.range_start);

        for _ in 0..MAX_JOIN_ATTEMPTS {
            let cached = |cache: &dyn BlockCache| {
                let mut blocks = Vec::with_capacity(keys.len());
                for key in &keys {
                    blocks.push((key.clone(), cache.get(key)?));
                }
                let blocks = BlockSet::new(blocks);
                usable(desc, assembler, &keys, &blocks).then_some(blocks)
            };

            let (blocks, source) = self
                .coordinator
                .get_or_fetch(lead.clone(), cached, self.window_fetch(desc))
                .await?;

            match source {
                FetchSource::Joined if !usable(desc, assembler, &keys, &blocks) => {
                    debug!(
                        file = %desc.file.name,
                        start = desc.range_start,
                        end = desc.range_end,
                        "Joined fetch does not cover descriptor, retrying"
                    );
                    continue;
                }
                // A short read of a raw file still yields its complete records
                FetchSource::Fetched => {
                    if let Some(missing) = keys.iter().find(|key| blocks.get(key).is_none()) {
                        return Err(FetchError::MissingBlock {
                            file: desc.file.name.clone(),
                            offset: key_offset(missing),
                        });
                    }
                }
                _ => {}
            }

            debug!(
                file = %desc.file.name,
                start = desc.range_start,
                end = desc.range_end,
                blocks = blocks.len(),
                source = ?source,
                "Loaded descriptor windows"
            );
            return Ok((blocks, source));
        }

        Err(FetchError::Interrupted {
            key: lead.to_string(),
            reason: format!("in-flight fetches did not cover {}..{}", desc.range_start, desc.range_end),
        })
    }

    /// The fetch of a descriptor's whole range, split into windows.
    fn window_fetch(
        &self,
        desc: &PacketDescriptor,
    ) -> impl FnOnce() -> BoxFuture<'static, std::result::Result<BlockSet, FetchError>> {
        let store = Arc::clone(&self.store);
        let file = Arc::clone(&desc.file);
        let range = desc.range_start..desc.range_end;
        let timeout = self.config.get_timeout();
        let decompressor = self.decompressor;

        move || {
            async move {
                let start = range.start;
                let data = fetch_range(store.as_ref(), &file.location, range, timeout).await?;
                split_blocks(&file, start, data, decompressor)
            }
            .boxed()
        }
    }
}

impl std::fmt::Debug for SessionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Issue one ranged GET bounded by `timeout`.
async fn fetch_range(
    store: &dyn ObjectStoreClient,
    location: &ObjectLocation,
    range: Range<u64>,
    timeout: Duration,
) -> std::result::Result<Bytes, FetchError> {
    debug!(
        bucket = location.bucket(),
        key = location.key(),
        start = range.start,
        end = range.end,
        "GET range"
    );

    match tokio::time::timeout(timeout, store.get_range(location, range)).await {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(e)) => Err(FetchError::Unavailable {
            bucket: location.bucket().to_string(),
            key: location.key().to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(FetchError::Timeout {
            bucket: location.bucket().to_string(),
            key: location.key().to_string(),
            timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
        }),
    }
}

/// Cut a fetched range into cacheable windows: one per block for
/// compressed files (each decompressed), or the whole range for raw files.
fn split_blocks(
    file: &FileInfo,
    start: u64,
    data: Bytes,
    decompressor: Decompressor,
) -> std::result::Result<BlockSet, FetchError> {
    let location = &file.location;

    if data.is_empty() {
        return Ok(BlockSet::default());
    }

    if !file.is_compressed() {
        let key = BlockKey::data(location.bucket(), location.key(), start);
        return Ok(BlockSet::single(key, data));
    }

    let block_size = file.compression_block_size.max(1);
    let chunk_len = usize::try_from(block_size).unwrap_or(usize::MAX);
    let mut blocks = Vec::with_capacity(data.len().div_ceil(chunk_len));

    for (i, chunk) in data.chunks(chunk_len).enumerate() {
        let offset = start + i as u64 * block_size;
        let plain = decompressor.decompress_block(&file.name, offset, chunk, file.compression)?;
        blocks.push((
            BlockKey::data(location.bucket(), location.key(), offset),
            Bytes::from(plain),
        ));
    }

    Ok(BlockSet::new(blocks))
}

/// Cache key of the window holding `sub`, and that window's start in the
/// coordinate space of `sub.packet_start`.
fn window_for(desc: &PacketDescriptor, sub: &SubPacket) -> (BlockKey, u64) {
    let location = &desc.file.location;
    if desc.compressed {
        (
            BlockKey::data(location.bucket(), location.key(), sub.range_start),
            0,
        )
    } else {
        (
            BlockKey::data(location.bucket(), location.key(), desc.range_start),
            desc.range_start,
        )
    }
}

/// Whether `blocks` holds every window of `desc`, and for a raw file a
/// window long enough for all its records.
fn usable(
    desc: &PacketDescriptor,
    assembler: PacketAssembler,
    keys: &[BlockKey],
    blocks: &BlockSet,
) -> bool {
    if !keys.iter().all(|key| blocks.get(key).is_some()) {
        return false;
    }
    if desc.compressed {
        return true;
    }
    keys.first()
        .and_then(|key| blocks.get(key))
        .is_some_and(|window| assembler.covers(window, desc.range_start, &desc.sub_packets))
}

fn key_offset(key: &BlockKey) -> u64 {
    match key {
        BlockKey::Data { offset, .. } => *offset,
        BlockKey::Header { .. } => 0,
    }
}

/// Global headers already parsed in this session, by marker.
#[derive(Default)]
struct HeaderMemo(Mutex<HashMap<i64, Arc<PcapHandle>>>);

struct Loaded {
    handle: Arc<PcapHandle>,
    packets: Vec<AssembledPacket>,
    skipped: Vec<usize>,
    source: FetchSource,
}

struct DescriptorOutput {
    items: Vec<usize>,
    result: Result<Loaded>,
}

type ReadyPacket = (usize, Arc<PcapHandle>, Bytes);

/// Restores item-position order across descriptors that complete out of
/// order. Skipped items are recorded as `None` so the cursor moves past them.
struct Sequencer {
    order: DeliveryOrder,
    next: usize,
    pending: BTreeMap<usize, Option<(Arc<PcapHandle>, Bytes)>>,
    ready: Vec<ReadyPacket>,
}

impl Sequencer {
    fn new(order: DeliveryOrder) -> Self {
        Self {
            order,
            next: 0,
            pending: BTreeMap::new(),
            ready: Vec::new(),
        }
    }

    fn push(&mut self, item_pos: usize, entry: Option<(Arc<PcapHandle>, Bytes)>) {
        match self.order {
            DeliveryOrder::AsCompleted => {
                if let Some((handle, record)) = entry {
                    self.ready.push((item_pos, handle, record));
                }
            }
            DeliveryOrder::Strict => {
                self.pending.insert(item_pos, entry);
                while let Some(entry) = self.pending.remove(&self.next) {
                    if let Some((handle, record)) = entry {
                        self.ready.push((self.next, handle, record));
                    }
                    self.next += 1;
                }
            }
        }
    }

    fn take_ready(&mut self) -> Vec<ReadyPacket> {
        std::mem::take(&mut self.ready)
    }
}

/// A [`SessionSink`] that keeps everything it receives.
#[derive(Debug, Default)]
pub struct PacketCollector {
    /// Header bytes passed to `on_header`
    pub header: Option<Bytes>,
    /// `(item_pos, file number, record)` in delivery order
    pub packets: Vec<(usize, u64, Bytes)>,
    /// Set by `on_complete`
    pub completed: bool,
    /// Error message passed to `on_complete`
    pub error: Option<String>,
}

impl PacketCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Item positions in delivery order.
    pub fn item_positions(&self) -> Vec<usize> {
        self.packets.iter().map(|(item_pos, _, _)| *item_pos).collect()
    }
}

impl SessionSink for PacketCollector {
    fn on_header(&mut self, _handle: &PcapHandle, header: &[u8]) -> Result<()> {
        self.header = Some(Bytes::copy_from_slice(header));
        Ok(())
    }

    fn on_packet(&mut self, handle: &PcapHandle, record: Bytes, item_pos: usize) -> Result<()> {
        self.packets.push((item_pos, handle.file_num(), record));
        Ok(())
    }

    fn on_complete(&mut self, error: Option<&Error>, _session: &Session) {
        self.completed = true;
        self.error = error.map(|e| e.to_string());
    }
}
