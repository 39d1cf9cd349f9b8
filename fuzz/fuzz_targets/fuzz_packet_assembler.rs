//! Fuzz target for record extraction from fetched windows.
//!
//! The first bytes choose the sub-packet span; the rest is the window.
//! Extraction must never panic or return a record outside the window.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pcapvault_core::pcap::PacketAssembler;
use pcapvault_core::SubPacket;

fuzz_target!(|data: &[u8]| {
    if data.len() < 5 {
        return;
    }

    let big_endian = data[0] & 1 == 1;
    let start = u16::from_le_bytes([data[1], data[2]]) as u64;
    let len = u16::from_le_bytes([data[3], data[4]]) as u64;
    let window = Bytes::copy_from_slice(&data[5..]);

    let packet = SubPacket {
        item_pos: 0,
        range_start: 0,
        range_end: window.len() as u64,
        packet_start: start,
        packet_end: start + len,
    };

    let assembler = PacketAssembler::new(big_endian);
    if let Ok(assembled) = assembler.assemble(&window, 0, &packet) {
        assert!(assembled.record.len() >= 16);
        assert!(assembled.record.len() as u64 <= len);
        assert!(start as usize + assembled.record.len() <= window.len());
    }
    let _ = assembler.covers(&window, 0, &[packet]);
});
