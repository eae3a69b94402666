//! Feed file opening: format detection, gzip, decoding, and tokenization.
//!
//! - **Format detection** from the file extension (`.csv`, `.tsv`, `.jsonl`,
//!   `.ndjson`), with an optional trailing `.gz`.
//! - **Compression**: gzip streams are recognised by extension or by their
//!   magic bytes and decoded with `flate2`.
//! - **Decoding**: input passes through `encoding_rs_io`, which strips a BOM
//!   and transcodes UTF-16 or an explicitly named legacy encoding to UTF-8.
//! - **Tokenization**: CSV/TSV rows become records keyed by header; JSONL
//!   lines must each hold one JSON object.
//!
//! All records are read before the pipeline starts, so a malformed row is
//! reported before any validation work happens.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use flate2::read::MultiGzDecoder;
use serde_json::Value;

use crate::{
    data::{FeedFormat, Record, is_empty_value},
    error::{FeedError, FeedResult},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedKind {
    pub format: FeedFormat,
    pub compressed: bool,
}

#[derive(Debug, Clone)]
pub struct FeedData {
    pub format: FeedFormat,
    pub compressed: bool,
    pub records: Vec<Record>,
}

impl FeedData {
    pub fn total(&self) -> usize {
        self.records.len()
    }
}

pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

pub fn detect_feed_kind(path: &Path) -> FeedResult<FeedKind> {
    let compressed = is_gzip_path(path);
    let inner = if compressed {
        path.file_stem().map(Path::new).unwrap_or(path)
    } else {
        path
    };
    let format = match inner
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => FeedFormat::Csv,
        Some("tsv") | Some("tab") => FeedFormat::Tsv,
        Some("jsonl") | Some("ndjson") => FeedFormat::Jsonl,
        _ => {
            return Err(FeedError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };
    Ok(FeedKind { format, compressed })
}

pub fn default_delimiter(format: FeedFormat) -> u8 {
    match format {
        FeedFormat::Tsv => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

fn io_error(path: &Path, source: io::Error) -> FeedError {
    FeedError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Looks up a WHATWG encoding label such as `latin1` or `windows-1252`.
pub fn resolve_encoding(label: Option<&str>) -> FeedResult<Option<&'static Encoding>> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| FeedError::UnknownEncoding {
                label: value.to_string(),
            }),
        None => Ok(None),
    }
}

/// Opens `path`, transparently decompressing gzip and decoding to UTF-8.
/// A byte-order mark takes precedence over `encoding`.
fn open_text_reader(
    path: &Path,
    encoding: Option<&'static Encoding>,
) -> FeedResult<(Box<dyn Read>, bool)> {
    let file = File::open(path).map_err(|err| io_error(path, err))?;
    let mut buffered = BufReader::new(file);
    let head = buffered.fill_buf().map_err(|err| io_error(path, err))?;
    let gzipped = head.starts_with(&GZIP_MAGIC);
    let raw: Box<dyn Read> = if gzipped {
        Box::new(MultiGzDecoder::new(buffered))
    } else {
        Box::new(buffered)
    };
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(encoding)
        .strip_bom(true)
        .build(raw);
    Ok((Box::new(decoded), gzipped))
}

/// Classifies read failures: inside a gzip stream they mean corruption.
fn read_error(path: &Path, gzipped: bool, source: io::Error) -> FeedError {
    if gzipped {
        FeedError::Decompression {
            path: path.to_path_buf(),
            source,
        }
    } else {
        io_error(path, source)
    }
}

pub fn open_feed(path: &Path, delimiter: Option<u8>) -> FeedResult<FeedData> {
    open_feed_with(path, delimiter, None)
}

pub fn open_feed_with(
    path: &Path,
    delimiter: Option<u8>,
    encoding: Option<&'static Encoding>,
) -> FeedResult<FeedData> {
    let kind = detect_feed_kind(path)?;
    let (reader, gzipped) = open_text_reader(path, encoding)?;
    if kind.compressed && !gzipped {
        return Err(FeedError::Decompression {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"),
        });
    }
    let records = match kind.format {
        FeedFormat::Csv | FeedFormat::Tsv => {
            let delimiter = delimiter.unwrap_or_else(|| default_delimiter(kind.format));
            read_delimited(reader, delimiter, path, gzipped)?
        }
        FeedFormat::Jsonl => read_jsonl(reader, path, gzipped)?,
    };
    Ok(FeedData {
        format: kind.format,
        compressed: gzipped,
        records,
    })
}

pub fn read_delimited<R: Read>(
    reader: R,
    delimiter: u8,
    path: &Path,
    gzipped: bool,
) -> FeedResult<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| csv_error(err, path, gzipped))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|err| csv_error(err, path, gzipped))?;
        let mut record = Record::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            // repeated headers keep the first non-empty cell
            match record.get_mut(header) {
                Some(existing) if is_empty_value(existing) => {
                    *existing = Value::String(cell.to_string());
                }
                Some(_) => {}
                None => {
                    record.insert(header.clone(), Value::String(cell.to_string()));
                }
            }
        }
        records.push(record);
    }
    Ok(records)
}

fn csv_error(err: csv::Error, path: &Path, gzipped: bool) -> FeedError {
    let line = err.position().map(|pos| pos.line()).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(source) => read_error(path, gzipped, source),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => FeedError::Parse {
            line,
            message: format!("expected {expected_len} field(s) but found {len}"),
        },
        csv::ErrorKind::Utf8 { err, .. } => FeedError::Parse {
            line,
            message: format!("invalid UTF-8: {err}"),
        },
        other => FeedError::Parse {
            line,
            message: format!("{other:?}"),
        },
    }
}

pub fn read_jsonl<R: Read>(reader: R, path: &Path, gzipped: bool) -> FeedResult<Vec<Record>> {
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(reader).split(b'\n').enumerate() {
        let line_number = idx as u64 + 1;
        let bytes = line.map_err(|err| read_error(path, gzipped, err))?;
        let line = String::from_utf8(bytes).map_err(|err| FeedError::Parse {
            line: line_number,
            message: format!("invalid UTF-8: {}", err.utf8_error()),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|err| FeedError::Parse {
            line: line_number,
            message: err.to_string(),
        })?;
        match value {
            Value::Object(record) => records.push(record),
            other => {
                return Err(FeedError::Parse {
                    line: line_number,
                    message: format!("expected a JSON object but found {}", json_kind(&other)),
                });
            }
        }
    }
    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn display_path(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf())
}
