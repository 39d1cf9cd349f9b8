//! Shared fixtures for integration tests: a counting in-memory store and a
//! builder for block-compressed pcap archives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use pcapvault_core::{
    Compression, FileInfo, ObjectLocation, ObjectStoreClient, StaticResolver, StoreError,
};

pub const NODE: &str = "node1";
pub const REGION: &str = "us-east-1";
pub const BUCKET: &str = "pcaps";

/// Object store double that records every ranged GET.
#[derive(Default)]
pub struct MockStore {
    objects: Mutex<HashMap<String, Bytes>>,
    requests: Mutex<Vec<(String, Range<u64>)>>,
    delay: Option<Duration>,
    fail: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every GET, so concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .insert(format!("{BUCKET}/{key}"), Bytes::from(data));
    }

    /// Make every following GET fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(String, Range<u64>)> {
        self.requests.lock().clone()
    }

    pub fn gets(&self) -> usize {
        self.requests.lock().len()
    }

    /// GETs of the file header prefix (`[0, header_len)`).
    pub fn header_gets(&self, header_len: u64) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(_, r)| *r == (0..header_len))
            .count()
    }

    /// GETs other than header prefix reads.
    pub fn body_gets(&self, header_len: u64) -> Vec<Range<u64>> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, r)| *r != (0..header_len))
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStoreClient for MockStore {
    async fn get_range(
        &self,
        location: &ObjectLocation,
        range: Range<u64>,
    ) -> Result<Bytes, StoreError> {
        let path = format!("{}/{}", location.bucket(), location.key());
        self.requests.lock().push((path.clone(), range.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Request("connection refused".into()));
        }

        let data = self
            .objects
            .lock()
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound { path: path.clone() })?;

        let end = (range.end as usize).min(data.len());
        let start = range.start as usize;
        if start > end {
            return Err(StoreError::Request(format!("range {range:?} not satisfiable")));
        }
        Ok(data.slice(start..end))
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StoreError> {
        let path = format!("{}/{}", location.bucket(), location.key());
        match self.objects.lock().remove(&path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { path }),
        }
    }
}

/// Classic pcap global header, microsecond resolution, Ethernet.
pub fn pcap_header(big_endian: bool) -> Vec<u8> {
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

    let mut header = Vec::with_capacity(24);
    header.extend_from_slice(&word(0xa1b2c3d4));
    header.extend_from_slice(&half(2));
    header.extend_from_slice(&half(4));
    header.extend_from_slice(&word(0)); // thiszone
    header.extend_from_slice(&word(0)); // sigfigs
    header.extend_from_slice(&word(65535)); // snaplen
    header.extend_from_slice(&word(1)); // LINKTYPE_ETHERNET
    header
}

/// One pcap record whose payload bytes are derived from `seq`.
pub fn record(seq: u32, payload_len: usize, big_endian: bool) -> Vec<u8> {
    let word = |v: u32| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut rec = Vec::with_capacity(16 + payload_len);
    rec.extend_from_slice(&word(1_700_000_000 + seq));
    rec.extend_from_slice(&word(seq));
    rec.extend_from_slice(&word(payload_len as u32));
    rec.extend_from_slice(&word(payload_len as u32));
    rec.extend((0..payload_len).map(|i| (seq as usize * 31 + i) as u8));
    rec
}

/// A built archive: the stored object plus where its records landed.
#[derive(Debug, Clone)]
pub struct Archive {
    pub num: u64,
    pub name: String,
    pub key: String,
    pub block_size: u64,
    pub data: Vec<u8>,
    /// Encoded position of each record (without the file marker)
    pub positions: Vec<i64>,
    pub records: Vec<Vec<u8>>,
}

impl Archive {
    pub fn file_info(&self) -> FileInfo {
        FileInfo::new(self.num, &self.name, self.block_size).unwrap()
    }

    /// `packetPos` for the given record indexes, led by the file marker.
    pub fn packet_pos(&self, records: &[usize]) -> Vec<i64> {
        let mut pos = vec![-(self.num as i64)];
        pos.extend(records.iter().map(|&i| self.positions[i]));
        pos
    }

    /// `packetLen` parallel to [`packet_pos`](Self::packet_pos).
    pub fn packet_len(&self, records: &[usize]) -> Vec<u64> {
        let mut len = vec![0];
        len.extend(records.iter().map(|&i| self.records[i].len() as u64));
        len
    }

    /// Store the archive and register its metadata.
    pub fn install(&self, store: &MockStore, resolver: &StaticResolver) {
        store.insert(&self.key, self.data.clone());
        resolver.insert(NODE, self.file_info());
    }
}

/// Builds a pcap archive laid out in blocks.
///
/// Records are appended to the current block; [`next_block`](Self::next_block)
/// starts a new one. Compressed archives compress each block on its own
/// and pad it with zeros to `block_size`; raw archives simply concatenate
/// the blocks.
pub struct ArchiveBuilder {
    num: u64,
    compression: Compression,
    block_size: u64,
    big_endian: bool,
    blocks: Vec<Vec<u8>>,
    placed: Vec<(usize, usize, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new(num: u64, compression: Compression) -> Self {
        Self {
            num,
            compression,
            block_size: 100_000,
            big_endian: false,
            blocks: Vec::new(),
            placed: Vec::new(),
        }
    }

    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    fn current(&mut self) -> &mut Vec<u8> {
        if self.blocks.is_empty() {
            self.blocks.push(pcap_header(self.big_endian));
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    /// Append record `seq` to the current block.
    pub fn record(mut self, seq: u32, payload_len: usize) -> Self {
        let rec = record(seq, payload_len, self.big_endian);
        let block = self.current();
        let offset = block.len();
        block.extend_from_slice(&rec);
        let index = self.blocks.len() - 1;
        self.placed.push((index, offset, rec));
        self
    }

    /// Pad the current block with filler up to `offset`, then append record
    /// `seq` there.
    pub fn record_at(mut self, offset: usize, seq: u32, payload_len: usize) -> Self {
        let block = self.current();
        assert!(block.len() <= offset, "record_at offset already used");
        block.resize(offset, 0xee);
        self.record(seq, payload_len)
    }

    /// Append raw bytes to the current block without tracking them.
    pub fn garbage(mut self, bytes: &[u8]) -> Self {
        self.current().extend_from_slice(bytes);
        self
    }

    pub fn next_block(mut self) -> Self {
        self.current();
        self.blocks.push(Vec::new());
        self
    }

    pub fn build(mut self) -> Archive {
        self.current();
        let name_ext = match self.compression.extension() {
            Some(ext) => format!("pcap.{ext}"),
            None => "pcap".to_string(),
        };
        let key = format!("{NODE}/{:06}-node1.{name_ext}", self.num);
        let name = format!("s3://{REGION}/{BUCKET}/{key}");

        let (data, block_starts) = if self.compression.is_compressed() {
            self.compressed()
        } else {
            let mut starts = Vec::new();
            let mut data = Vec::new();
            for block in &self.blocks {
                starts.push(data.len() as u64);
                data.extend_from_slice(block);
            }
            (data, starts)
        };

        let positions = self
            .placed
            .iter()
            .map(|(block, offset, _)| (block_starts[*block] + *offset as u64) as i64)
            .collect();

        Archive {
            num: self.num,
            name,
            key,
            block_size: if self.compression.is_compressed() {
                self.block_size
            } else {
                0
            },
            data,
            positions,
            records: self.placed.into_iter().map(|(_, _, rec)| rec).collect(),
        }
    }

    fn compressed(&self) -> (Vec<u8>, Vec<u64>) {
        let block_size = self.block_size as usize;
        let mut data = Vec::new();
        let mut starts = Vec::new();

        for (index, plain) in self.blocks.iter().enumerate() {
            assert!(plain.len() < block_size, "block {index} plaintext too large");
            let mut block = match self.compression {
                Compression::Gzip if index == 0 => gzip_first_block(plain),
                Compression::Gzip => deflate_block(plain),
                Compression::Zstd if index == 0 => {
                    // Header in its own frame so a short prefix decodes it
                    let mut out = zstd::encode_all(&plain[..24], 3).unwrap();
                    out.extend(zstd::encode_all(&plain[24..], 3).unwrap());
                    out
                }
                Compression::Zstd => zstd::encode_all(plain.as_slice(), 3).unwrap(),
                Compression::None => unreachable!(),
            };
            assert!(block.len() <= block_size, "block {index} compressed too large");
            block.resize(block_size, 0);

            starts.push(data.len() as u64);
            data.extend_from_slice(&block);
        }

        (data, starts)
    }
}

/// Gzip member header plus a sync-flushed deflate segment, no trailer.
fn gzip_first_block(plain: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&plain[..24]).unwrap();
    encoder.flush().unwrap();
    encoder.write_all(&plain[24..]).unwrap();
    encoder.flush().unwrap();
    encoder.get_ref().clone()
}

/// Sync-flushed raw deflate segment.
fn deflate_block(plain: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(plain).unwrap();
    encoder.flush().unwrap();
    encoder.get_ref().clone()
}

/// The classic scenario: a gzip file numbered 5 with 100000-byte blocks and
/// records at plaintext offsets 1000 and 1500 of block 0.
pub fn scenario_archive() -> Archive {
    ArchiveBuilder::new(5, Compression::Gzip)
        .block_size(100_000)
        .record_at(1000, 0, 200)
        .record_at(1500, 1, 300)
        .build()
}

/// Store and resolver holding `archives`.
pub fn setup(store: MockStore, archives: &[&Archive]) -> (Arc<MockStore>, Arc<StaticResolver>) {
    let store = Arc::new(store);
    let resolver = Arc::new(StaticResolver::new());
    for archive in archives {
        archive.install(&store, &resolver);
    }
    (store, resolver)
}
