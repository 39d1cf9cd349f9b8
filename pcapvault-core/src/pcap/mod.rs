//! Pcap global headers and record extraction.

mod assembler;
mod header;

pub use assembler::{
    extract_record, record_len, AssembledPacket, PacketAssembler, RECORD_HEADER_LEN,
};
pub use header::{PcapFormat, PcapHandle, PCAP_HEADER_LEN};
