//! Validation orchestrator.
//!
//! Drives every record of a feed through reconciliation, raw-issue detection,
//! and schema validation, in input order, on the calling thread. The run
//! checkpoints every `chunk_size` records: it emits a [`ProgressSnapshot`] and
//! yields the thread before continuing. Cancellation is checked before each
//! record, never in the middle of one.
//!
//! Counters are exact for the whole run, while the retained issue and
//! valid-record lists are capped independently; anything beyond a cap is
//! counted and flagged as truncated but not kept.

use std::{
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::PipelineConfig,
    data::{FeedFormat, Record},
    error::FeedResult,
    io_utils,
    issues::{RawIssue, RawIssueCollector, Severity, ValidationIssue},
    raw_issues::detect_raw_issues,
    reconcile::{
        FieldMapping, apply_field_mapping, apply_normalizers, inject_defaults, resolve_aliases,
    },
    validators::{ValidatorDefinition, ValidatorRegistry},
};

/// Field name used for issues that are not tied to one column.
pub const RECORD_FIELD: &str = "_record";

/// Shared flag a caller sets to stop a run at the next record boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub retain_valid_records: bool,
    /// Explicit source-to-canonical renames; disables automatic alias resolution.
    pub field_mapping: Option<FieldMapping>,
    pub config: PipelineConfig,
    /// Delimiter override for CSV/TSV input.
    pub delimiter: Option<u8>,
    /// Source encoding when the file is neither UTF-8 nor BOM-marked.
    pub encoding: Option<&'static Encoding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub is_complete: bool,
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub valid_records: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub validator: String,
    pub validator_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FeedFormat>,
    pub state: RunState,
    /// True only when the run completed and every processed record was valid.
    pub success: bool,
    pub summary: RunSummary,
    pub raw_issues: Vec<RawIssue>,
    pub issues_truncated: bool,
    pub records_truncated: bool,
}

impl ValidationOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordValidationResult {
    pub row: usize,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    /// Typed canonical record, present only when valid.
    pub data: Option<Record>,
    /// Canonical record before validation, kept for diffing.
    pub canonical: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normalize,
    Precheck,
}

/// Reconciles and validates a single record.
pub fn validate_record(
    row: usize,
    raw: &Record,
    definition: &ValidatorDefinition,
    mapping: Option<&FieldMapping>,
) -> RecordValidationResult {
    validate_record_with(row, raw, definition, mapping, Mode::Normalize)
}

fn validate_record_with(
    row: usize,
    raw: &Record,
    definition: &ValidatorDefinition,
    mapping: Option<&FieldMapping>,
    mode: Mode,
) -> RecordValidationResult {
    let mut canonical = match mapping {
        Some(mapping) => apply_field_mapping(raw, mapping),
        None => resolve_aliases(raw, &definition.aliases),
    };
    inject_defaults(&mut canonical, &definition.defaults);
    if mode == Mode::Normalize {
        apply_normalizers(&mut canonical, &definition.normalizers);
    }
    let validation = definition.rules.validate(row, &canonical);
    RecordValidationResult {
        row,
        is_valid: validation.is_valid,
        issues: validation.issues,
        data: validation.data,
        canonical,
    }
}

/// Runs one record with panics converted into a single error issue.
fn validate_isolated(
    row: usize,
    raw: &Record,
    definition: &ValidatorDefinition,
    mapping: Option<&FieldMapping>,
    mode: Mode,
) -> RecordValidationResult {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        validate_record_with(row, raw, definition, mapping, mode)
    })) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Row {row}: validator '{}' panicked: {reason}", definition.id);
            RecordValidationResult {
                row,
                is_valid: false,
                issues: vec![ValidationIssue::error(
                    row,
                    RECORD_FIELD,
                    format!("internal error while validating record: {reason}"),
                    None,
                )],
                data: None,
                canonical: raw.clone(),
            }
        }
    }
}

struct Run<'a> {
    config: &'a PipelineConfig,
    retain_valid: bool,
    state: RunState,
    summary: RunSummary,
    raw_issues: RawIssueCollector,
    issues_truncated: bool,
    records_truncated: bool,
}

impl<'a> Run<'a> {
    fn new(total: usize, config: &'a PipelineConfig, retain_valid: bool) -> Self {
        Self {
            config,
            retain_valid,
            state: RunState::Initializing,
            summary: RunSummary {
                total_rows: total,
                ..RunSummary::default()
            },
            raw_issues: RawIssueCollector::new(config.max_raw_issues),
            issues_truncated: false,
            records_truncated: false,
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_rows: self.summary.total_rows,
            processed_rows: self.summary.processed_rows,
            valid_rows: self.summary.valid_rows,
            invalid_rows: self.summary.invalid_rows,
            error_count: self.summary.error_count,
            warning_count: self.summary.warning_count,
            is_complete: self.state == RunState::Completed,
            is_cancelled: self.state == RunState::Cancelled,
        }
    }

    fn absorb(&mut self, result: RecordValidationResult) {
        let summary = &mut self.summary;
        summary.processed_rows += 1;
        if result.is_valid {
            summary.valid_rows += 1;
        } else {
            summary.invalid_rows += 1;
        }
        for issue in result.issues {
            match issue.severity {
                Severity::Error => summary.error_count += 1,
                Severity::Warning => summary.warning_count += 1,
                Severity::Info => {}
            }
            if summary.issues.len() < self.config.max_issues {
                summary.issues.push(issue);
            } else {
                self.issues_truncated = true;
            }
        }
        if self.retain_valid
            && let Some(data) = result.data
        {
            if summary.valid_records.len() < self.config.max_valid_records {
                summary.valid_records.push(data);
            } else {
                self.records_truncated = true;
            }
        }
    }

    fn finish(self, definition: &ValidatorDefinition, format: Option<FeedFormat>) -> ValidationOutcome {
        let success = self.state == RunState::Completed && self.summary.invalid_rows == 0;
        ValidationOutcome {
            validator: definition.id.clone(),
            validator_version: definition.version.clone(),
            format,
            state: self.state,
            success,
            summary: self.summary,
            raw_issues: self.raw_issues.into_issues(),
            issues_truncated: self.issues_truncated,
            records_truncated: self.records_truncated,
        }
    }
}

fn emit(progress: &mut Option<&mut dyn FnMut(&ProgressSnapshot)>, snapshot: ProgressSnapshot) {
    if let Some(callback) = progress.as_mut() {
        callback(&snapshot);
    }
}

fn drive<'a>(
    records: &[Record],
    definition: &ValidatorDefinition,
    options: &'a ValidateOptions,
    mode: Mode,
    mut progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> Run<'a> {
    let config = &options.config;
    let chunk_size = config.chunk_size.max(1);
    let retain_valid = options.retain_valid_records && mode == Mode::Normalize;
    let mapping = options.field_mapping.as_ref();
    let mut run = Run::new(records.len(), config, retain_valid);
    emit(&mut progress, run.snapshot());

    run.state = RunState::Processing;
    for (idx, raw) in records.iter().enumerate() {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            info!(
                "Validation cancelled after {} of {} row(s)",
                run.summary.processed_rows, run.summary.total_rows
            );
            run.state = RunState::Cancelled;
            break;
        }
        let row = idx + 1;
        if row <= config.raw_issue_preview_rows {
            let findings = match mapping {
                Some(mapping) => detect_raw_issues(row, &apply_field_mapping(raw, mapping), definition, false),
                None => detect_raw_issues(row, raw, definition, true),
            };
            for finding in findings {
                run.raw_issues.record(finding);
            }
        }
        let result = validate_isolated(row, raw, definition, mapping, mode);
        run.absorb(result);

        if run.summary.processed_rows % chunk_size == 0 {
            let snapshot = run.snapshot();
            debug!(
                "Checkpoint: {}/{} row(s), {} valid, {} invalid",
                snapshot.processed_rows, snapshot.total_rows, snapshot.valid_rows, snapshot.invalid_rows
            );
            emit(&mut progress, snapshot);
            thread::yield_now();
        }
    }
    if run.state == RunState::Processing {
        run.state = RunState::Completed;
    }
    emit(&mut progress, run.snapshot());
    run
}

/// Reconciles, normalizes, and validates every record.
pub fn validate_records(
    records: &[Record],
    definition: &ValidatorDefinition,
    options: &ValidateOptions,
    progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> ValidationOutcome {
    drive(records, definition, options, Mode::Normalize, progress, cancel).finish(definition, None)
}

/// Validates records as supplied, with aliases and defaults but no normalizers,
/// to show the feed's as-is state. Valid records are never retained.
pub fn precheck_records(
    records: &[Record],
    definition: &ValidatorDefinition,
    options: &ValidateOptions,
    progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> ValidationOutcome {
    drive(records, definition, options, Mode::Precheck, progress, cancel).finish(definition, None)
}

fn run_file(
    path: &Path,
    registry: &ValidatorRegistry,
    validator_id: &str,
    options: &ValidateOptions,
    mode: Mode,
    progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> FeedResult<ValidationOutcome> {
    let definition = registry.get(validator_id)?;
    let kind = io_utils::detect_feed_kind(path)?;
    definition.ensure_supports(kind.format)?;
    let feed = io_utils::open_feed_with(path, options.delimiter, options.encoding)?;
    info!(
        "Validating {} row(s) from {:?} ({}{}) with '{}' v{}",
        feed.total(),
        io_utils::display_path(path),
        feed.format,
        if feed.compressed { ", gzip" } else { "" },
        definition.id,
        definition.version
    );
    let run = drive(&feed.records, definition, options, mode, progress, cancel);
    let outcome = run.finish(definition, Some(feed.format));
    info!(
        "Finished ({:?}): {} valid, {} invalid, {} error(s), {} raw issue(s)",
        outcome.state,
        outcome.summary.valid_rows,
        outcome.summary.invalid_rows,
        outcome.summary.error_count,
        outcome.raw_issues.len()
    );
    Ok(outcome)
}

/// Opens a feed file and validates it with the named validator.
pub fn validate_file(
    path: &Path,
    registry: &ValidatorRegistry,
    validator_id: &str,
    options: &ValidateOptions,
    progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> FeedResult<ValidationOutcome> {
    run_file(path, registry, validator_id, options, Mode::Normalize, progress, cancel)
}

/// Opens a feed file and reports its as-is pass/fail state without normalizing.
pub fn precheck_file(
    path: &Path,
    registry: &ValidatorRegistry,
    validator_id: &str,
    options: &ValidateOptions,
    progress: Option<&mut dyn FnMut(&ProgressSnapshot)>,
    cancel: Option<&CancellationToken>,
) -> FeedResult<ValidationOutcome> {
    run_file(path, registry, validator_id, options, Mode::Precheck, progress, cancel)
}
