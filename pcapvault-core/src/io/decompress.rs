//! Block decompression.
//!
//! Archived pcap files are cut into fixed-size blocks that decompress
//! independently:
//!
//! - gzip: block 0 starts with the gzip member header; every block is a
//!   raw deflate segment ending on a sync flush, followed by padding up to
//!   the block size. Inflation stops at the first byte that is not valid
//!   deflate data, so the padding is never interpreted.
//! - zstd: each block is one or more complete frames, followed by padding.
//!
//! [`decompress_header`] reads just the leading bytes of a file, which is
//! how the 24-byte global header is recovered from a short ranged GET.

use std::io::{self, Cursor, Read};

use flate2::read::GzDecoder;
use flate2::{Decompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Zstandard frame magic, little-endian on the wire.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Output grows in steps of this size while inflating.
const INFLATE_CHUNK: usize = 64 * 1024;

/// Compression scheme of an archived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Stored raw
    None,
    /// Gzip (.gz)
    Gzip,
    /// Zstandard (.zst)
    Zstd,
}

impl Compression {
    /// Derive the scheme from a stored file name's extension.
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(".gz") {
            Compression::Gzip
        } else if name.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    /// Get the typical file extension for this compression format.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
        }
    }

    /// Check if this represents compressed data.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// Decompresses whole blocks with a cap on inflated size.
#[derive(Debug, Clone, Copy)]
pub struct Decompressor {
    max_output: usize,
}

impl Decompressor {
    /// Create a decompressor that rejects blocks inflating past `max_output` bytes.
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }

    /// Decompress one block that starts at `offset` in `file`.
    ///
    /// `Compression::None` returns the bytes unchanged.
    pub fn decompress_block(
        &self,
        file: &str,
        offset: u64,
        data: &[u8],
        compression: Compression,
    ) -> Result<Vec<u8>, FetchError> {
        let result = match compression {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip if offset == 0 => gunzip_stream(data, self.max_output),
            Compression::Gzip => inflate_raw(data, self.max_output),
            Compression::Zstd => zstd_frames(data, self.max_output),
        };

        result.map_err(|e| FetchError::Decompression {
            file: file.to_string(),
            offset,
            reason: e.to_string(),
        })
    }
}

/// Decode block 0 of a gzip file: skip the member header, then inflate.
///
/// `flate2` parses the header from the front of the slice and leaves the
/// rest of it, the deflate body, in place. Sync-flushed archives have no
/// trailer at the end of block 0.
fn gunzip_stream(data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let decoder = flate2::bufread::GzDecoder::new(data);
    if decoder.header().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing gzip member header",
        ));
    }

    let body: &[u8] = decoder.get_ref();
    inflate_raw(body, limit)
}

/// Raw-inflate a deflate segment.
///
/// Stops at the end of the deflate stream, at the end of input, or at the
/// first invalid data once output was produced (block padding).
fn inflate_raw(data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut output = Vec::with_capacity(INFLATE_CHUNK.min(limit.max(1)));

    loop {
        if output.len() == output.capacity() {
            if output.len() >= limit {
                return Err(too_large(limit));
            }
            output.reserve_exact(INFLATE_CHUNK.min(limit - output.len()));
        }

        let consumed_before = inflater.total_in();
        let produced_before = inflater.total_out();
        let consumed = consumed_before as usize;

        let status =
            match inflater.decompress_vec(&data[consumed..], &mut output, FlushDecompress::Sync) {
                Ok(status) => status,
                Err(_) if !output.is_empty() => break,
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            };

        if status == Status::StreamEnd {
            break;
        }

        let has_room = output.len() < output.capacity();
        let input_done = inflater.total_in() as usize >= data.len();
        let progressed =
            inflater.total_in() != consumed_before || inflater.total_out() != produced_before;

        if has_room && (input_done || !progressed) {
            break;
        }
    }

    if output.is_empty() && !data.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "deflate block produced no output",
        ));
    }

    check_limit(output.len(), limit)?;
    Ok(output)
}

/// Decode consecutive zstd frames until the first non-frame byte.
fn zstd_frames(data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut rest = data;

    while rest.starts_with(&ZSTD_MAGIC) {
        let frame_len = zstd::zstd_safe::find_frame_compressed_size(rest).map_err(|code| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                zstd::zstd_safe::get_error_name(code),
            )
        })?;

        let remaining = (limit - output.len()) as u64;
        let mut decoder = zstd::stream::read::Decoder::with_buffer(&rest[..frame_len])?
            .take(remaining + 1);
        decoder.read_to_end(&mut output)?;
        check_limit(output.len(), limit)?;

        rest = &rest[frame_len..];
    }

    if output.is_empty() && !data.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "block does not start with a zstd frame",
        ));
    }

    Ok(output)
}

fn check_limit(len: usize, limit: usize) -> io::Result<()> {
    if len > limit {
        Err(too_large(limit))
    } else {
        Ok(())
    }
}

fn too_large(limit: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("block inflates past {limit} bytes"),
    )
}

/// Decompress the leading bytes of a file.
///
/// # Arguments
/// * `compressed` - Prefix of the stored object (e.g. the first 128 bytes)
/// * `compression` - Compression scheme of the file
/// * `output_size` - Maximum bytes to decompress (24 for a pcap global header)
///
/// # Returns
/// Decompressed bytes, up to `output_size` bytes. The prefix usually ends
/// mid-stream, so running out of input simply ends the output.
pub fn decompress_header(
    compressed: &[u8],
    compression: Compression,
    output_size: usize,
) -> io::Result<Vec<u8>> {
    let mut decoder: Box<dyn Read + '_> = match compression {
        Compression::None => {
            let len = compressed.len().min(output_size);
            return Ok(compressed[..len].to_vec());
        }
        Compression::Gzip => Box::new(GzDecoder::new(Cursor::new(compressed))),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(compressed)?),
    };

    let mut output = vec![0u8; output_size];
    let mut total_read = 0;

    while total_read < output_size {
        match decoder.read(&mut output[total_read..]) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && total_read > 0 => break,
            Err(e) => return Err(e),
        }
    }

    output.truncate(total_read);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn plaintext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn raw_deflate_sync(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.flush().unwrap();
        encoder.get_ref().clone()
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(
            Compression::from_file_name("node1/1-230101-1.pcap.gz"),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_file_name("node1/1-230101-1.pcap.zst"),
            Compression::Zstd
        );
        assert_eq!(
            Compression::from_file_name("node1/1-230101-1.pcap"),
            Compression::None
        );
    }

    #[test]
    fn test_compression_display_and_extension() {
        assert_eq!(format!("{}", Compression::Zstd), "zstd");
        assert_eq!(Compression::Gzip.extension(), Some("gz"));
        assert!(!Compression::None.is_compressed());
    }

    #[test]
    fn test_none_passes_through() {
        let block = Decompressor::new(1024)
            .decompress_block("f", 4096, b"abc", Compression::None)
            .unwrap();
        assert_eq!(block, b"abc");
    }

    #[test]
    fn test_raw_inflate_ignores_padding() {
        let data = plaintext(10_000);
        let mut block = raw_deflate_sync(&data);
        block.resize(block.len() + 500, 0);

        let out = Decompressor::new(1 << 20)
            .decompress_block("f", 8192, &block, Compression::Gzip)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_gzip_block_zero_without_trailer() {
        let data = plaintext(3000);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).unwrap();
        encoder.flush().unwrap();
        let mut block = encoder.get_ref().clone();
        block.resize(block.len() + 64, 0);

        let out = Decompressor::new(1 << 20)
            .decompress_block("f", 0, &block, Compression::Gzip)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_gzip_block_zero_with_file_name() {
        let data = plaintext(2000);
        let mut encoder = flate2::GzBuilder::new()
            .filename("1-230101-1.pcap")
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).unwrap();
        let block = encoder.finish().unwrap();

        let out = Decompressor::new(1 << 20)
            .decompress_block("f", 0, &block, Compression::Gzip)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_gzip_block_zero_with_optional_header_fields() {
        let data = plaintext(4000);
        let mut encoder = flate2::GzBuilder::new()
            .filename("000005-node1.pcap")
            .comment("capture node1")
            .extra(vec![b'P', b'V', 2, 0, 7, 7])
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(&data).unwrap();
        encoder.flush().unwrap();
        let mut block = encoder.get_ref().clone();
        block.resize(block.len() + 128, 0);

        let out = Decompressor::new(1 << 20)
            .decompress_block("f", 0, &block, Compression::Gzip)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_gzip_block_zero_needs_member_header() {
        let block = raw_deflate_sync(&plaintext(500));
        assert!(Decompressor::new(1 << 20)
            .decompress_block("f", 0, &block, Compression::Gzip)
            .is_err());

        // Header cut off inside the file name
        let mut encoder = flate2::GzBuilder::new()
            .filename("000005-node1.pcap")
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plaintext(500)).unwrap();
        encoder.flush().unwrap();
        let truncated = &encoder.get_ref()[..14];
        assert!(Decompressor::new(1 << 20)
            .decompress_block("f", 0, truncated, Compression::Gzip)
            .is_err());
    }

    #[test]
    fn test_garbage_deflate_block_fails() {
        let err = Decompressor::new(1 << 20)
            .decompress_block("node1/3.pcap.gz", 8192, &[0xff; 64], Compression::Gzip)
            .unwrap_err();
        assert!(err.to_string().contains("node1/3.pcap.gz"));
    }

    #[test]
    fn test_zstd_multiple_frames_then_padding() {
        let first = plaintext(24);
        let second = plaintext(5000);
        let mut block = zstd::encode_all(first.as_slice(), 3).unwrap();
        block.extend(zstd::encode_all(second.as_slice(), 3).unwrap());
        block.resize(block.len() + 100, 0);

        let out = Decompressor::new(1 << 20)
            .decompress_block("f", 0, &block, Compression::Zstd)
            .unwrap();
        assert_eq!(out.len(), 5024);
        assert_eq!(&out[..24], first.as_slice());
        assert_eq!(&out[24..], second.as_slice());
    }

    #[test]
    fn test_output_limit() {
        let data = vec![0u8; 100_000];
        let block = zstd::encode_all(data.as_slice(), 3).unwrap();

        let err = Decompressor::new(1000)
            .decompress_block("capture.pcap.zst", 0, &block, Compression::Zstd)
            .unwrap_err();
        assert!(matches!(err, FetchError::Decompression { ref file, .. } if file == "capture.pcap.zst"));

        let block = raw_deflate_sync(&data);
        assert!(Decompressor::new(1000)
            .decompress_block("f", 4096, &block, Compression::Gzip)
            .is_err());
    }

    #[test]
    fn test_corrupt_block_names_file() {
        let err = Decompressor::new(1 << 20)
            .decompress_block("node1/7.pcap.zst", 4096, &[0x00; 64], Compression::Zstd)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("node1/7.pcap.zst"), "{msg}");
        assert!(msg.contains("4096"), "{msg}");
    }

    #[test]
    fn test_decompress_header_no_compression() {
        let data = vec![0xd4, 0xc3, 0xb2, 0xa1, 0x00, 0x02, 0x00, 0x04];
        assert_eq!(decompress_header(&data, Compression::None, 100).unwrap(), data);
        assert_eq!(
            decompress_header(&data, Compression::None, 4).unwrap(),
            vec![0xd4, 0xc3, 0xb2, 0xa1]
        );
    }

    #[test]
    fn test_decompress_header_gzip_prefix() {
        let header = plaintext(24);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&header).unwrap();
        encoder.flush().unwrap();
        encoder.write_all(&plaintext(50_000)).unwrap();
        let compressed = encoder.finish().unwrap();

        let result = decompress_header(&compressed[..128], Compression::Gzip, 24).unwrap();
        assert_eq!(result, header);
    }

    #[test]
    fn test_decompress_header_zstd_prefix() {
        let header = plaintext(24);
        let mut compressed = zstd::encode_all(header.as_slice(), 3).unwrap();
        compressed.extend(zstd::encode_all(plaintext(50_000).as_slice(), 3).unwrap());

        let result = decompress_header(&compressed[..128], Compression::Zstd, 24).unwrap();
        assert_eq!(result, header);
    }
}
