use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Reconcile and validate product feed files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize and validate a feed, optionally exporting valid records as JSON Lines
    Validate(ValidateArgs),
    /// Check a feed as-is, without normalizing values
    Precheck(RunArgs),
    /// List the available validators
    Validators,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Feed file (.csv, .tsv, .jsonl, .ndjson, optionally .gz)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Validator identifier
    #[arg(short = 'v', long = "validator", default_value = "openai")]
    pub validator: String,
    /// YAML or JSON file mapping source columns to canonical fields
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Pipeline configuration YAML file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Records processed between progress updates
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Maximum number of issues kept in the report
    #[arg(long = "max-issues")]
    pub max_issues: Option<usize>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input (e.g. latin1, windows-1252); defaults to UTF-8
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write the full outcome as JSON to this path
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub run: RunArgs,
    /// Export valid records as JSON Lines (gzip when the name ends in .gz)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Maximum number of valid records kept for export
    #[arg(long = "max-valid-records")]
    pub max_valid_records: Option<usize>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
