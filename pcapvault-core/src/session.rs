//! Session index records.
//!
//! A session as stored in the index carries the packet position list plus
//! arbitrary SPI fields. The read path only needs `node`, `packetPos`,
//! `packetLen` and `packetPosEncoding`; everything else is carried through
//! untouched and handed back on completion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PlanError;

/// How `packetPos` entries are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosEncoding {
    /// Entries are absolute byte offsets
    Absolute,
    /// Entries are gaps from the previous offset; a gap of 0 repeats the previous gap
    Gap0,
}

impl PosEncoding {
    pub fn parse(encoding: Option<&str>) -> Result<Self, PlanError> {
        match encoding {
            None => Ok(PosEncoding::Absolute),
            Some("gap0") => Ok(PosEncoding::Gap0),
            Some(other) => Err(PlanError::UnknownEncoding(other.to_string())),
        }
    }
}

/// One session's index record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Capture node that wrote the files
    pub node: String,

    /// File markers (negative) and packet offsets
    pub packet_pos: Vec<i64>,

    /// Packet lengths, parallel to `packet_pos`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_len: Option<Vec<u64>>,

    /// Encoding of `packet_pos`; absent means absolute offsets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_pos_encoding: Option<String>,

    /// Remaining SPI fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Session {
    pub fn new(node: impl Into<String>, packet_pos: Vec<i64>) -> Self {
        Self {
            id: None,
            node: node.into(),
            packet_pos,
            packet_len: None,
            packet_pos_encoding: None,
            fields: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_packet_len(mut self, packet_len: Vec<u64>) -> Self {
        self.packet_len = Some(packet_len);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.packet_pos_encoding = Some(encoding.into());
        self
    }

    /// Absolute positions and lengths, truncated to `max_packets` entries.
    ///
    /// The session itself is left unchanged.
    pub fn positions(&self, max_packets: Option<usize>) -> Result<Positions, PlanError> {
        let encoding = PosEncoding::parse(self.packet_pos_encoding.as_deref())?;

        let limit = max_packets.unwrap_or(usize::MAX).min(self.packet_pos.len());
        let raw = &self.packet_pos[..limit];

        let pos = match encoding {
            PosEncoding::Absolute => raw.to_vec(),
            PosEncoding::Gap0 => decode_gap0(raw),
        };

        let len = self
            .packet_len
            .as_ref()
            .map(|lens| lens.iter().take(limit).copied().collect());

        Ok(Positions { pos, len })
    }

    /// Distinct file numbers referenced by markers, in first-seen order.
    pub fn file_nums(&self) -> Vec<u64> {
        file_nums(&self.packet_pos)
    }
}

/// Decoded, absolute packet positions of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positions {
    /// Markers (negative) and absolute offsets
    pub pos: Vec<i64>,
    /// Lengths parallel to `pos`, if the session recorded them
    pub len: Option<Vec<u64>>,
}

impl Positions {
    /// Distinct file numbers referenced by markers, in first-seen order.
    pub fn file_nums(&self) -> Vec<u64> {
        file_nums(&self.pos)
    }
}

fn file_nums(pos: &[i64]) -> Vec<u64> {
    let mut nums = Vec::new();
    for &p in pos.iter().filter(|&&p| p < 0) {
        let num = p.unsigned_abs();
        if !nums.contains(&num) {
            nums.push(num);
        }
    }
    nums
}

fn decode_gap0(raw: &[i64]) -> Vec<i64> {
    let mut last = 0i64;
    let mut last_gap = 0i64;

    raw.iter()
        .map(|&p| {
            if p < 0 {
                last = 0;
                last_gap = 0;
                return p;
            }
            let gap = if p == 0 { last_gap } else { p };
            last_gap = gap;
            last = last.saturating_add(gap);
            last
        })
        .collect()
}
