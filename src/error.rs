use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures that stop a run before the first record is processed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unsupported feed file '{path}': expected .csv, .tsv, .jsonl or .ndjson (optionally .gz)")]
    UnsupportedFormat { path: PathBuf },
    #[error("Reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt compressed stream in {path:?}: {source}")]
    Decompression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed content at line {line}: {message}")]
    Parse { line: u64, message: String },
    #[error("Unknown encoding '{label}'")]
    UnknownEncoding { label: String },
    #[error("Unknown validator '{id}'. Available validators: {}", available.join(", "))]
    UnknownValidator { id: String, available: Vec<String> },
    #[error(
        "Validator '{validator}' does not accept {format} feeds. Supported formats: {}",
        supported.join(", ")
    )]
    FormatNotSupported {
        validator: String,
        format: String,
        supported: Vec<String>,
    },
}

impl FeedError {
    /// True for errors caused by the uploaded file rather than the caller's choices.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FeedError::UnsupportedFormat { .. }
                | FeedError::Io { .. }
                | FeedError::Decompression { .. }
                | FeedError::Parse { .. }
        )
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
