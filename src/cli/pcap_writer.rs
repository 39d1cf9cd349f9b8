//! Pcap file output for fetched sessions.

use std::io::{self, Write};

use bytes::Bytes;

use pcapvault_core::{Error, PcapHandle, Result, Session, SessionSink, RECORD_HEADER_LEN};

/// [`SessionSink`] that writes a session as one classic pcap file.
///
/// The first file's global header becomes the output header. Records from
/// files with the other byte order have their record header swapped, so
/// multi-file sessions stay readable.
pub struct PcapFileSink<W: Write> {
    writer: W,
    big_endian: Option<bool>,
    packets: usize,
    bytes: u64,
    error: Option<String>,
}

impl<W: Write> PcapFileSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            big_endian: None,
            packets: 0,
            bytes: 0,
            error: None,
        }
    }

    /// Packets written so far.
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Bytes written so far, header included.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Error reported on completion, if the session failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Flush and return the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).map_err(Error::Io)?;
        self.bytes += data.len() as u64;
        Ok(())
    }
}

impl<W: Write> SessionSink for PcapFileSink<W> {
    fn on_header(&mut self, handle: &PcapHandle, header: &[u8]) -> Result<()> {
        self.big_endian = Some(handle.is_big_endian());
        self.write_all(header)
    }

    fn on_packet(&mut self, handle: &PcapHandle, record: Bytes, _item_pos: usize) -> Result<()> {
        match self.big_endian {
            Some(out) if out != handle.is_big_endian() => {
                let swapped = swap_record_header(&record);
                self.write_all(&swapped)?;
            }
            _ => self.write_all(&record)?,
        }
        self.packets += 1;
        Ok(())
    }

    fn on_complete(&mut self, error: Option<&Error>, _session: &Session) {
        self.error = error.map(|e| e.to_string());
    }
}

/// Reverse the byte order of the four record header words.
fn swap_record_header(record: &[u8]) -> Vec<u8> {
    let mut out = record.to_vec();
    if out.len() >= RECORD_HEADER_LEN {
        for word in out[..RECORD_HEADER_LEN].chunks_exact_mut(4) {
            word.reverse();
        }
    }
    out
}
