//! Byte-range planning.
//!
//! Turns a session's absolute packet positions into the list of ranged GETs
//! to issue. Planning runs in two pure steps:
//!
//! 1. [`ByteRangePlanner::describe`] emits one descriptor per packet. For a
//!    compressed file the range is the whole block holding the packet and
//!    the packet span is relative to the decompressed block; for a raw file
//!    the range is the packet span itself.
//! 2. [`ByteRangePlanner::coalesce`] folds descriptors of the same file
//!    whose range starts inside `[prev.range_start, prev.range_end + slack)`
//!    into the previous descriptor, extending its range when needed.
//!
//! Every descriptor lists its own packet as `sub_packets[0]`, so callers
//! treat all packets uniformly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PlanError;
use crate::resolve::FileInfo;

/// Planner tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Bytes past a range end that still join the range
    pub coalesce_slack: u64,
    /// Packet span assumed when no length was recorded
    pub default_packet_len: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            coalesce_slack: 32 * 1024,
            default_packet_len: 65536,
        }
    }
}

/// One packet inside a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPacket {
    /// Index of the packet among the session's packets
    pub item_pos: usize,
    /// Range holding the packet (its block, for compressed files)
    pub range_start: u64,
    pub range_end: u64,
    /// Packet span: relative to the decompressed block at `range_start`
    /// for compressed files, absolute for raw files
    pub packet_start: u64,
    pub packet_end: u64,
}

/// A byte range to fetch and the packets it yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub file: Arc<FileInfo>,
    /// Marker that introduced the file (e.g. `-5`)
    pub marker: i64,
    pub compressed: bool,
    pub range_start: u64,
    pub range_end: u64,
    pub packet_start: u64,
    pub packet_end: u64,
    pub item_pos: usize,
    pub sub_packets: Vec<SubPacket>,
}

impl PacketDescriptor {
    /// Length of the ranged GET.
    pub fn range_len(&self) -> u64 {
        self.range_end - self.range_start
    }

    /// Distinct block starts covered by this descriptor, ascending.
    ///
    /// For compressed files these are the cache keys of the decompressed
    /// blocks; for raw files the single window start.
    pub fn window_starts(&self) -> Vec<u64> {
        if !self.compressed {
            return vec![self.range_start];
        }
        let mut starts: Vec<u64> = self.sub_packets.iter().map(|p| p.range_start).collect();
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    /// Item positions of every packet in this descriptor.
    pub fn item_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.sub_packets.iter().map(|p| p.item_pos)
    }
}

/// Plans byte ranges for sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteRangePlanner {
    config: PlannerConfig,
}

impl ByteRangePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Describe and coalesce.
    pub fn plan(
        &self,
        pos: &[i64],
        len: Option<&[u64]>,
        files: &HashMap<u64, Arc<FileInfo>>,
    ) -> Result<Vec<PacketDescriptor>, PlanError> {
        Ok(self.coalesce(self.describe(pos, len, files)?))
    }

    /// One descriptor per packet, in session order.
    pub fn describe(
        &self,
        pos: &[i64],
        len: Option<&[u64]>,
        files: &HashMap<u64, Arc<FileInfo>>,
    ) -> Result<Vec<PacketDescriptor>, PlanError> {
        let mut descriptors = Vec::new();
        let mut current: Option<(i64, &Arc<FileInfo>)> = None;
        let mut item_pos = 0;

        for (index, &p) in pos.iter().enumerate() {
            if p < 0 {
                let num = p.unsigned_abs();
                let file = files.get(&num).ok_or(PlanError::UnresolvedFile { num })?;
                current = Some((p, file));
                continue;
            }

            let (marker, file) = current.ok_or(PlanError::MissingFileMarker { index, pos: p })?;
            if p == 0 {
                return Err(PlanError::ZeroOffset { index });
            }

            let packet_len = len
                .and_then(|l| l.get(index).copied())
                .filter(|&l| l > 0)
                .unwrap_or(self.config.default_packet_len);

            let offset = p as u64;
            let packet = if file.is_compressed() {
                let block_size = file.block_size()?;
                let range_start = offset / block_size * block_size;
                let packet_start = offset % block_size;
                SubPacket {
                    item_pos,
                    range_start,
                    range_end: range_start + block_size,
                    packet_start,
                    packet_end: packet_start + packet_len,
                }
            } else {
                SubPacket {
                    item_pos,
                    range_start: offset,
                    range_end: offset + packet_len,
                    packet_start: offset,
                    packet_end: offset + packet_len,
                }
            };

            descriptors.push(PacketDescriptor {
                file: Arc::clone(file),
                marker,
                compressed: file.is_compressed(),
                range_start: packet.range_start,
                range_end: packet.range_end,
                packet_start: packet.packet_start,
                packet_end: packet.packet_end,
                item_pos,
                sub_packets: vec![packet],
            });
            item_pos += 1;
        }

        Ok(descriptors)
    }

    /// Fold descriptors of the same file whose range starts within the
    /// previous range plus slack.
    pub fn coalesce(&self, descriptors: Vec<PacketDescriptor>) -> Vec<PacketDescriptor> {
        let mut out: Vec<PacketDescriptor> = Vec::with_capacity(descriptors.len());

        for desc in descriptors {
            if let Some(prev) = out.last_mut() {
                let same_file = prev.file.num == desc.file.num && prev.marker == desc.marker;
                let window_end = prev.range_end.saturating_add(self.config.coalesce_slack);
                if same_file && desc.range_start >= prev.range_start && desc.range_start < window_end
                {
                    prev.range_end = prev.range_end.max(desc.range_end);
                    prev.sub_packets.extend(desc.sub_packets);
                    continue;
                }
            }
            out.push(desc);
        }

        out
    }
}
