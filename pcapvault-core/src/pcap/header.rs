//! Pcap global header parsing.
//!
//! Every archived file starts with the classic 24-byte pcap header:
//!
//! ```text
//! 0       4       6       8      12      16      20      24
//! +-------+---+---+-------+-------+-------+-------+
//! | magic |maj|min|thiszone|sigfigs|snaplen|network|
//! +-------+---+---+-------+-------+-------+-------+
//! ```
//!
//! The magic, read little-endian, selects byte order and timestamp
//! precision for every record in the file.

use bytes::Bytes;

use crate::error::PcapError;

/// Length of the classic pcap global header.
pub const PCAP_HEADER_LEN: usize = 24;

/// Classic pcap variants, by magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
}

impl PcapFormat {
    /// Detect PCAP format from magic bytes.
    pub fn detect(data: &[u8]) -> Result<Self, PcapError> {
        let magic = data
            .get(..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| PcapError::InvalidFormat {
                reason: "Data too small for PCAP magic".into(),
            })?;

        match magic {
            0xa1b2c3d4 => Ok(PcapFormat::LegacyLeMicro),
            0xd4c3b2a1 => Ok(PcapFormat::LegacyBeMicro),
            0xa1b23c4d => Ok(PcapFormat::LegacyLeNano),
            0x4d3cb2a1 => Ok(PcapFormat::LegacyBeNano),
            _ => Err(PcapError::InvalidFormat {
                reason: format!("Corrupt PCAP header, unknown magic {magic:#010x}"),
            }),
        }
    }

    pub fn is_big_endian(&self) -> bool {
        matches!(self, PcapFormat::LegacyBeMicro | PcapFormat::LegacyBeNano)
    }

    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LegacyLeNano | PcapFormat::LegacyBeNano)
    }
}

/// Read a u32 in the file's byte order.
pub(crate) fn read_u32(data: &[u8], offset: usize, big_endian: bool) -> Option<u32> {
    let b = data.get(offset..offset + 4)?;
    let bytes = [b[0], b[1], b[2], b[3]];
    Some(if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    })
}

/// Parsed global header of one archived file.
///
/// Handed to the packet sink with every record so the caller knows how to
/// interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapHandle {
    node: String,
    file_num: u64,
    format: PcapFormat,
    snaplen: u32,
    link_type: u32,
    header: Bytes,
}

impl PcapHandle {
    /// Parse the 24-byte global header of file `file_num` on `node`.
    pub fn parse(node: &str, file_num: u64, header: Bytes) -> Result<Self, PcapError> {
        if header.len() < PCAP_HEADER_LEN {
            return Err(PcapError::InvalidFormat {
                reason: format!(
                    "Missing PCAP header: need {PCAP_HEADER_LEN} bytes, have {}",
                    header.len()
                ),
            });
        }

        let format = PcapFormat::detect(&header)?;
        let big_endian = format.is_big_endian();
        let snaplen = read_u32(&header, 16, big_endian).unwrap_or_default();
        let link_type = read_u32(&header, 20, big_endian).unwrap_or_default();

        Ok(Self {
            node: node.to_string(),
            file_num,
            format,
            snaplen,
            link_type,
            header: header.slice(..PCAP_HEADER_LEN),
        })
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn file_num(&self) -> u64 {
        self.file_num
    }

    pub fn format(&self) -> PcapFormat {
        self.format
    }

    pub fn is_big_endian(&self) -> bool {
        self.format.is_big_endian()
    }

    pub fn is_nanosecond(&self) -> bool {
        self.format.is_nanosecond()
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// Data link type (e.g. 1 for Ethernet).
    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    /// The raw 24 header bytes.
    pub fn header_bytes(&self) -> &Bytes {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32, big_endian: bool, link_type: u32) -> Bytes {
        let word = |v: u32| {
            if big_endian {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            }
        };
        let half = |v: u16| {
            if big_endian {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            }
        };

        let mut h = Vec::with_capacity(PCAP_HEADER_LEN);
        h.extend_from_slice(&word(magic));
        h.extend_from_slice(&half(2));
        h.extend_from_slice(&half(4));
        h.extend_from_slice(&word(0));
        h.extend_from_slice(&word(0));
        h.extend_from_slice(&word(65535));
        h.extend_from_slice(&word(link_type));
        Bytes::from(h)
    }

    #[test]
    fn test_little_endian_micro() {
        let handle = PcapHandle::parse("node1", 5, header(0xa1b2c3d4, false, 1)).unwrap();
        assert_eq!(handle.format(), PcapFormat::LegacyLeMicro);
        assert!(!handle.is_big_endian());
        assert!(!handle.is_nanosecond());
        assert_eq!(handle.link_type(), 1);
        assert_eq!(handle.snaplen(), 65535);
        assert_eq!(handle.file_num(), 5);
        assert_eq!(handle.node(), "node1");
    }

    #[test]
    fn test_big_endian_micro() {
        // Written big-endian, the magic reads back as 0xd4c3b2a1
        let handle = PcapHandle::parse("n", 1, header(0xa1b2c3d4, true, 101)).unwrap();
        assert_eq!(handle.format(), PcapFormat::LegacyBeMicro);
        assert!(handle.is_big_endian());
        assert_eq!(handle.link_type(), 101);
    }

    #[test]
    fn test_nanosecond_variants() {
        let le = PcapHandle::parse("n", 1, header(0xa1b23c4d, false, 1)).unwrap();
        assert_eq!(le.format(), PcapFormat::LegacyLeNano);
        assert!(le.is_nanosecond());

        let be = PcapHandle::parse("n", 1, header(0xa1b23c4d, true, 1)).unwrap();
        assert_eq!(be.format(), PcapFormat::LegacyBeNano);
        assert!(be.is_big_endian());
        assert!(be.is_nanosecond());
    }

    #[test]
    fn test_rejects_unknown_magic() {
        let err = PcapHandle::parse("n", 1, header(0x0a0d0d0a, false, 1)).unwrap_err();
        assert!(err.to_string().contains("Corrupt PCAP header"));
    }

    #[test]
    fn test_rejects_short_header() {
        let err = PcapHandle::parse("n", 1, Bytes::from_static(&[0xd4, 0xc3, 0xb2, 0xa1]))
            .unwrap_err();
        assert!(matches!(err, PcapError::InvalidFormat { .. }));
    }

    #[test]
    fn test_header_bytes_trimmed() {
        let mut long = header(0xa1b2c3d4, false, 1).to_vec();
        long.extend_from_slice(&[0u8; 40]);
        let handle = PcapHandle::parse("n", 1, Bytes::from(long)).unwrap();
        assert_eq!(handle.header_bytes().len(), PCAP_HEADER_LEN);
    }
}
