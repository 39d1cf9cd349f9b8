//! Packet record extraction.
//!
//! A window is either a decompressed block or a raw byte range. Each
//! sub-packet names a slice of it; the slice starts with a 16-byte record
//! header whose captured length (offset 8) gives the record size.

use bytes::Bytes;

use super::header::{read_u32, PcapHandle};
use crate::error::PcapError;
use crate::plan::SubPacket;

/// Length of a classic pcap record header.
pub const RECORD_HEADER_LEN: usize = 16;

/// Largest captured length accepted in a record header.
const MAX_CAPTURED_LEN: u32 = 0xffff;

/// Total record length (header + captured bytes) of the record at `offset`.
///
/// Returns `None` when the window is too short for the record header.
pub fn record_len(window: &[u8], offset: usize, big_endian: bool) -> Option<usize> {
    if window.len() < offset.checked_add(RECORD_HEADER_LEN)? {
        return None;
    }
    let cap_len = read_u32(window, offset + 8, big_endian)?;
    Some(cap_len as usize + RECORD_HEADER_LEN)
}

/// Slice one record out of `window`.
///
/// `wanted` bounds how far the record may extend past `offset` (the
/// planned packet span); it is clamped to the window.
pub fn extract_record(
    window: &Bytes,
    offset: usize,
    wanted: usize,
    big_endian: bool,
    item_pos: usize,
) -> Result<Bytes, PcapError> {
    let end = offset.saturating_add(wanted).min(window.len());
    let available = end.saturating_sub(offset);

    if available < RECORD_HEADER_LEN {
        return Err(PcapError::TruncatedRecord {
            item_pos,
            expected: RECORD_HEADER_LEN,
            actual: available,
        });
    }

    let cap_len = read_u32(window, offset + 8, big_endian).unwrap_or_default();
    if cap_len > MAX_CAPTURED_LEN {
        return Err(PcapError::InvalidCapLen { item_pos, cap_len });
    }

    let total = cap_len as usize + RECORD_HEADER_LEN;
    if total > available {
        return Err(PcapError::TruncatedRecord {
            item_pos,
            expected: total,
            actual: available,
        });
    }

    Ok(window.slice(offset..offset + total))
}

/// A record ready for the packet sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPacket {
    pub item_pos: usize,
    pub record: Bytes,
}

/// Extracts sub-packet records from windows of one file.
#[derive(Debug, Clone, Copy)]
pub struct PacketAssembler {
    big_endian: bool,
}

impl PacketAssembler {
    pub fn new(big_endian: bool) -> Self {
        Self { big_endian }
    }

    pub fn for_handle(handle: &PcapHandle) -> Self {
        Self::new(handle.is_big_endian())
    }

    /// Extract `packet` from `window`, whose first byte sits at
    /// `window_start` in the coordinate space of `packet.packet_start`
    /// (the absolute range start for raw windows, 0 for decompressed blocks).
    pub fn assemble(
        &self,
        window: &Bytes,
        window_start: u64,
        packet: &SubPacket,
    ) -> Result<AssembledPacket, PcapError> {
        let offset = packet
            .packet_start
            .checked_sub(window_start)
            .ok_or(PcapError::TruncatedRecord {
                item_pos: packet.item_pos,
                expected: RECORD_HEADER_LEN,
                actual: 0,
            })?;
        let wanted = packet.packet_end.saturating_sub(packet.packet_start);

        let record = extract_record(
            window,
            usize::try_from(offset).unwrap_or(usize::MAX),
            usize::try_from(wanted).unwrap_or(usize::MAX),
            self.big_endian,
            packet.item_pos,
        )?;

        Ok(AssembledPacket {
            item_pos: packet.item_pos,
            record,
        })
    }

    /// Whether every packet's record lies complete inside `window`.
    pub fn covers(&self, window: &Bytes, window_start: u64, packets: &[SubPacket]) -> bool {
        packets
            .iter()
            .all(|p| self.assemble(window, window_start, p).is_ok())
    }
}
