use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use flate2::{Compression, write::GzEncoder};

use crate::{data::Record, io_utils};

/// Writes one compact JSON object per line.
pub fn write_jsonl_to<W: Write>(writer: &mut W, records: &[Record]) -> Result<()> {
    for (idx, record) in records.iter().enumerate() {
        serde_json::to_writer(&mut *writer, record)
            .with_context(|| format!("Serializing record {}", idx + 1))?;
        writer.write_all(b"\n").context("Writing record separator")?;
    }
    Ok(())
}

/// Exports records as JSON Lines, gzip-compressed when `path` ends in `.gz`.
/// Returns the number of records written.
pub fn write_jsonl(path: &Path, records: &[Record]) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    if io_utils::is_gzip_path(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_jsonl_to(&mut encoder, records)?;
        encoder
            .finish()
            .and_then(|mut inner| inner.flush())
            .with_context(|| format!("Finishing gzip stream {path:?}"))?;
    } else {
        let mut writer = BufWriter::new(file);
        write_jsonl_to(&mut writer, records)?;
        writer.flush().context("Flushing output writer")?;
    }
    Ok(records.len())
}
