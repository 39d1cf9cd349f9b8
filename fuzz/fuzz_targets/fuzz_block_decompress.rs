//! Fuzz target for block and header decompression.
//!
//! Arbitrary bytes are decoded as block 0 and as a later block of every
//! compression scheme, and as a file prefix for header decoding. Inflated
//! output is capped so decompression bombs fail instead of exhausting memory.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcapvault_core::io::{decompress_header, Compression, Decompressor};

/// Maximum inflated bytes per block.
const MAX_BLOCK_OUTPUT: usize = 1024 * 1024; // 1MB

fuzz_target!(|data: &[u8]| {
    let decompressor = Decompressor::new(MAX_BLOCK_OUTPUT);

    for compression in [Compression::None, Compression::Gzip, Compression::Zstd] {
        for offset in [0, 65536] {
            if let Ok(out) = decompressor.decompress_block("fuzz", offset, data, compression) {
                assert!(out.len() <= MAX_BLOCK_OUTPUT.max(data.len()));
            }
        }

        if let Ok(header) = decompress_header(data, compression, 24) {
            assert!(header.len() <= 24);
        }
    }
});
