pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod io_utils;
pub mod issues;
pub mod normalize;
pub mod pipeline;
pub mod raw_issues;
pub mod reconcile;
pub mod report;
pub mod rules;
pub mod validators;

use std::{env, fs::File, io::BufWriter, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, RunArgs, ValidateArgs},
    config::PipelineConfig,
    pipeline::{ProgressSnapshot, ValidateOptions, ValidationOutcome},
    validators::ValidatorRegistry,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("feed_reconcile", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let registry = ValidatorRegistry::builtin();
    match cli.command {
        Commands::Validate(args) => handle_validate(&registry, &args),
        Commands::Precheck(args) => handle_precheck(&registry, &args),
        Commands::Validators => {
            handle_list(&registry);
            Ok(())
        }
    }
}

fn build_options(args: &RunArgs) -> Result<ValidateOptions> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Loading pipeline config from {path:?}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(max_issues) = args.max_issues {
        config.max_issues = max_issues;
    }
    config.ensure_valid()?;
    let field_mapping = match &args.mapping {
        Some(path) => Some(
            config::load_field_mapping(path)
                .with_context(|| format!("Loading field mapping from {path:?}"))?,
        ),
        None => None,
    };
    Ok(ValidateOptions {
        retain_valid_records: false,
        field_mapping,
        config,
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    })
}

fn log_progress(snapshot: &ProgressSnapshot) {
    if snapshot.is_cancelled {
        info!("Cancelled at {}/{} row(s)", snapshot.processed_rows, snapshot.total_rows);
    } else if !snapshot.is_complete && snapshot.processed_rows > 0 {
        info!(
            "Processed {}/{} row(s): {} valid, {} invalid",
            snapshot.processed_rows, snapshot.total_rows, snapshot.valid_rows, snapshot.invalid_rows
        );
    }
}

fn write_report(path: &Path, outcome: &ValidationOutcome) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), outcome)
        .with_context(|| format!("Writing report to {path:?}"))
}

fn finish(outcome: &ValidationOutcome, report_path: Option<&Path>) -> Result<()> {
    print!("{}", report::render_outcome(outcome));
    if let Some(path) = report_path {
        write_report(path, outcome)?;
        info!("Report written to {path:?}");
    }
    if !outcome.success {
        bail!(
            "{} of {} row(s) failed validation",
            outcome.summary.invalid_rows,
            outcome.summary.processed_rows
        );
    }
    Ok(())
}

fn handle_validate(registry: &ValidatorRegistry, args: &ValidateArgs) -> Result<()> {
    let mut options = build_options(&args.run)?;
    options.retain_valid_records = args.output.is_some();
    if let Some(max_valid_records) = args.max_valid_records {
        options.config.max_valid_records = max_valid_records;
    }
    let mut progress = log_progress;
    let outcome = pipeline::validate_file(
        &args.run.input,
        registry,
        &args.run.validator,
        &options,
        Some(&mut progress),
        None,
    )
    .with_context(|| format!("Validating {:?}", args.run.input))?;

    if let Some(output) = &args.output {
        let written = export::write_jsonl(output, &outcome.summary.valid_records)?;
        info!("Exported {written} valid record(s) to {output:?}");
        if outcome.records_truncated {
            info!(
                "Export capped at {} record(s); raise --max-valid-records to keep more",
                options.config.max_valid_records
            );
        }
    }
    finish(&outcome, args.run.report.as_deref())
}

fn handle_precheck(registry: &ValidatorRegistry, args: &RunArgs) -> Result<()> {
    let options = build_options(args)?;
    let mut progress = log_progress;
    let outcome = pipeline::precheck_file(&args.input, registry, &args.validator, &options, Some(&mut progress), None)
        .with_context(|| format!("Pre-checking {:?}", args.input))?;
    finish(&outcome, args.report.as_deref())
}

fn handle_list(registry: &ValidatorRegistry) {
    let rows = registry
        .definitions()
        .iter()
        .map(|definition| {
            vec![
                definition.id.clone(),
                definition.name.clone(),
                definition.version.clone(),
                definition
                    .formats
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", report::render_table(&["id", "name", "version", "formats"], &rows));
}
