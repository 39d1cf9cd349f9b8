//! Output formatting for fetch plans.

use std::io::Write;

use clap::ValueEnum;
use serde_json::json;

use pcapvault_core::PacketDescriptor;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table (default)
    Table,
    /// JSON Lines (one JSON object per descriptor)
    Json,
}

/// Formats planned descriptors for output.
pub struct PlanFormatter {
    format: OutputFormat,
}

impl PlanFormatter {
    /// Create a new formatter with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn write<W: Write>(&self, plan: &[PacketDescriptor], writer: &mut W) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Table => self.write_table(plan, writer),
            OutputFormat::Json => self.write_json(plan, writer),
        }
    }

    fn write_table<W: Write>(&self, plan: &[PacketDescriptor], writer: &mut W) -> std::io::Result<()> {
        writeln!(
            writer,
            "{:<6} {:<12} {:>14} {:>14} {:>10} {:>8}  Items",
            "File", "Compression", "Range start", "Range end", "Bytes", "Packets"
        )?;
        writeln!(writer, "{:-<80}", "")?;

        for desc in plan {
            writeln!(
                writer,
                "{:<6} {:<12} {:>14} {:>14} {:>10} {:>8}  {}",
                desc.file.num,
                desc.file.compression.to_string(),
                desc.range_start,
                desc.range_end,
                desc.range_len(),
                desc.sub_packets.len(),
                format_items(desc),
            )?;
        }

        let bytes: u64 = plan.iter().map(|d| d.range_len()).sum();
        let packets: usize = plan.iter().map(|d| d.sub_packets.len()).sum();
        writeln!(writer, "{:-<80}", "")?;
        writeln!(
            writer,
            "{} GETs, {} bytes, {} packets",
            plan.len(),
            bytes,
            packets
        )
    }

    fn write_json<W: Write>(&self, plan: &[PacketDescriptor], writer: &mut W) -> std::io::Result<()> {
        for desc in plan {
            let value = json!({
                "file": desc.file.name,
                "num": desc.file.num,
                "compressed": desc.compressed,
                "rangeStart": desc.range_start,
                "rangeEnd": desc.range_end,
                "items": desc.item_positions().collect::<Vec<_>>(),
            });
            writeln!(writer, "{value}")?;
        }
        Ok(())
    }
}

/// Item positions as compact runs, e.g. `0-3,7`.
fn format_items(desc: &PacketDescriptor) -> String {
    let mut items: Vec<usize> = desc.item_positions().collect();
    items.sort_unstable();

    let mut runs: Vec<String> = Vec::new();
    let mut iter = items.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        runs.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }
    runs.join(",")
}
