use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::reconcile::FieldMapping;

pub const DEFAULT_CHUNK_SIZE: usize = 250;
pub const DEFAULT_MAX_ISSUES: usize = 1_000;
pub const DEFAULT_MAX_VALID_RECORDS: usize = 10_000;
pub const DEFAULT_RAW_ISSUE_PREVIEW_ROWS: usize = 100;
pub const DEFAULT_MAX_RAW_ISSUES: usize = 20;

/// Tunables for one pipeline run, loadable from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Records processed between progress snapshots.
    pub chunk_size: usize,
    pub max_issues: usize,
    pub max_valid_records: usize,
    /// Leading rows scanned by the raw-issue detector.
    pub raw_issue_preview_rows: usize,
    pub max_raw_issues: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_issues: DEFAULT_MAX_ISSUES,
            max_valid_records: DEFAULT_MAX_VALID_RECORDS,
            raw_issue_preview_rows: DEFAULT_RAW_ISSUE_PREVIEW_ROWS,
            max_raw_issues: DEFAULT_MAX_RAW_ISSUES,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: PipelineConfig =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing pipeline config YAML")?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "chunk_size must be positive");
        Ok(())
    }
}

/// Reads a `source: canonical` mapping from YAML or JSON (JSON is valid YAML).
pub fn load_field_mapping(path: &Path) -> Result<FieldMapping> {
    let file = File::open(path).with_context(|| format!("Opening field mapping {path:?}"))?;
    let mapping: FieldMapping =
        serde_yaml::from_reader(BufReader::new(file)).context("Parsing field mapping")?;
    for (source, target) in &mapping {
        ensure!(
            !target.trim().is_empty(),
            "Field mapping for '{source}' has an empty target"
        );
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_keys_take_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "chunk_size: 50").unwrap();
        let config = PipelineConfig::load(file.path()).expect("load config");
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.max_issues, DEFAULT_MAX_ISSUES);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "chunk_size: 0").unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn field_mapping_accepts_json() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, r#"{{"sku": "item_id", "Name": "title"}}"#).unwrap();
        let mapping = load_field_mapping(file.path()).expect("load mapping");
        assert_eq!(mapping.get("sku").map(String::as_str), Some("item_id"));
        assert_eq!(mapping.len(), 2);
    }
}
