mod common;

use std::{collections::BTreeMap, fs::File, io::Write};

use common::{TestWorkspace, product_csv, product_record, record};
use feed_reconcile::{
    config::PipelineConfig,
    data::{FeedFormat, Record},
    error::FeedError,
    issues::Severity,
    pipeline::{
        self, CancellationToken, ProgressSnapshot, RunState, ValidateOptions, precheck_records,
        validate_record, validate_records,
    },
    validators::{ValidatorRegistry, openai_product_feed},
};
use flate2::{Compression, write::GzEncoder};
use proptest::prelude::*;
use serde_json::json;

fn options(config: PipelineConfig) -> ValidateOptions {
    ValidateOptions {
        retain_valid_records: true,
        config,
        ..ValidateOptions::default()
    }
}

fn invalid_record(id: &str) -> Record {
    let mut raw = product_record(id);
    raw.remove("title");
    raw.insert("link".into(), json!("not a url"));
    raw
}

#[test]
fn free_text_availability_normalizes_and_validates() {
    let definition = openai_product_feed();
    let result = validate_record(1, &product_record("A1"), &definition, None);
    assert!(result.is_valid, "unexpected issues: {:?}", result.issues);
    let data = result.data.expect("typed record");
    assert_eq!(data["availability"], json!("in_stock"));
    assert_eq!(data["inventory_quantity"], json!(5));
    assert_eq!(data["return_window"], json!(30));
    assert_eq!(data["is_eligible_checkout"], json!(false));
}

#[test]
fn comma_decimal_price_is_corrected_and_reported() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("price".into(), json!("19,99 EUR"));
    let outcome = validate_records(
        &[raw],
        &definition,
        &options(PipelineConfig::default()),
        None,
        None,
    );
    assert!(outcome.success);
    assert_eq!(outcome.summary.valid_records[0]["price"], json!("19.99 EUR"));
    let finding = outcome
        .raw_issues
        .iter()
        .find(|issue| issue.field == "price")
        .expect("price finding");
    assert_eq!(finding.message, "price format corrected");
    assert_eq!(finding.severity, Severity::Info);
    assert_eq!(finding.row, 1);
}

#[test]
fn checkout_without_terms_yields_single_cross_field_error() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("is_eligible_checkout".into(), json!("true"));
    raw.insert(
        "seller_privacy_policy".into(),
        json!("https://shop.example.com/privacy"),
    );
    let result = validate_record(1, &raw, &definition, None);
    assert!(!result.is_valid);
    assert_eq!(result.issues.len(), 1, "issues: {:?}", result.issues);
    let issue = &result.issues[0];
    assert_eq!(issue.field, "seller_tos");
    assert_eq!(issue.severity, Severity::Error);
    assert!(issue.message.contains("is_eligible_checkout"));
}

#[test]
fn explicit_mapping_bypasses_alias_table() {
    let definition = openai_product_feed();
    let mapping = BTreeMap::from([
        ("sku".to_string(), "item_id".to_string()),
        ("merchant_ref".to_string(), "mpn".to_string()),
    ]);
    let raw = record(json!({"sku": "A1", "merchant_ref": "M-9", "name": "Widget"}));
    let result = validate_record(1, &raw, &definition, Some(&mapping));
    assert_eq!(result.canonical["item_id"], json!("A1"));
    assert_eq!(result.canonical["mpn"], json!("M-9"));
    assert!(!result.canonical.contains_key("sku"));
    assert!(!result.canonical.contains_key("title"));
    assert_eq!(result.canonical["name"], json!("Widget"));
    assert_eq!(result.canonical["condition"], json!("new"));
}

#[test]
fn cancellation_stops_at_record_boundary() {
    let definition = openai_product_feed();
    let records = (1..=1000)
        .map(|idx| product_record(&format!("SKU{idx}")))
        .collect::<Vec<_>>();
    let config = PipelineConfig {
        chunk_size: 50,
        ..PipelineConfig::default()
    };
    let token = CancellationToken::new();
    let mut snapshots = Vec::new();
    let mut on_progress = |snapshot: &ProgressSnapshot| {
        snapshots.push(*snapshot);
        if snapshot.processed_rows == 50 {
            token.cancel();
        }
    };
    let outcome = validate_records(
        &records,
        &definition,
        &options(config),
        Some(&mut on_progress),
        Some(&token),
    );

    assert_eq!(outcome.state, RunState::Cancelled);
    assert!(outcome.is_cancelled());
    assert!(!outcome.success);
    assert_eq!(outcome.summary.processed_rows, 50);
    assert_eq!(outcome.summary.total_rows, 1000);
    let last = snapshots.last().expect("final snapshot");
    assert_eq!(last.processed_rows, 50);
    assert!(!last.is_complete);
    assert!(last.is_cancelled);
}

#[test]
fn cancelled_before_start_processes_nothing() {
    let definition = openai_product_feed();
    let token = CancellationToken::new();
    token.cancel();
    let outcome = validate_records(
        &[product_record("A1")],
        &definition,
        &ValidateOptions::default(),
        None,
        Some(&token),
    );
    assert_eq!(outcome.summary.processed_rows, 0);
    assert_eq!(outcome.state, RunState::Cancelled);
}

#[test]
fn snapshots_keep_counters_consistent() {
    let definition = openai_product_feed();
    let records = (1..=23)
        .map(|idx| {
            let id = format!("SKU{idx}");
            if idx % 4 == 0 {
                invalid_record(&id)
            } else {
                product_record(&id)
            }
        })
        .collect::<Vec<_>>();
    let config = PipelineConfig {
        chunk_size: 5,
        ..PipelineConfig::default()
    };
    let mut snapshots = Vec::new();
    let mut on_progress = |snapshot: &ProgressSnapshot| snapshots.push(*snapshot);
    let outcome = validate_records(
        &records,
        &definition,
        &options(config),
        Some(&mut on_progress),
        None,
    );

    // initial, one per full chunk, final
    assert_eq!(snapshots.len(), 1 + 4 + 1);
    assert_eq!(snapshots[0].processed_rows, 0);
    for window in snapshots.windows(2) {
        assert!(window[0].processed_rows <= window[1].processed_rows);
    }
    for snapshot in &snapshots {
        assert_eq!(snapshot.processed_rows, snapshot.valid_rows + snapshot.invalid_rows);
        assert!(snapshot.processed_rows <= snapshot.total_rows);
    }
    let last = snapshots.last().expect("final snapshot");
    assert!(last.is_complete);
    assert_eq!(last.processed_rows, 23);
    assert_eq!(outcome.summary.invalid_rows, 5);
    assert_eq!(outcome.summary.valid_rows, 18);
    assert!(!outcome.success);
}

#[test]
fn retained_lists_respect_independent_caps() {
    let definition = openai_product_feed();
    let mut records = (1..=4)
        .map(|idx| invalid_record(&format!("BAD{idx}")))
        .collect::<Vec<_>>();
    records.extend((1..=6).map(|idx| product_record(&format!("OK{idx}"))));
    let config = PipelineConfig {
        max_issues: 3,
        max_valid_records: 2,
        ..PipelineConfig::default()
    };
    let outcome = validate_records(&records, &definition, &options(config), None, None);

    assert_eq!(outcome.summary.issues.len(), 3);
    assert!(outcome.issues_truncated);
    assert_eq!(outcome.summary.error_count, 8);
    assert_eq!(outcome.summary.valid_records.len(), 2);
    assert!(outcome.records_truncated);
    assert_eq!(outcome.summary.valid_rows, 6);
    assert_eq!(outcome.summary.valid_records[0]["item_id"], json!("OK1"));
}

#[test]
fn valid_records_are_dropped_unless_requested() {
    let definition = openai_product_feed();
    let outcome = validate_records(
        &[product_record("A1")],
        &definition,
        &ValidateOptions::default(),
        None,
        None,
    );
    assert!(outcome.success);
    assert!(outcome.summary.valid_records.is_empty());
    assert!(!outcome.records_truncated);
}

#[test]
fn repeated_runs_are_identical() {
    let definition = openai_product_feed();
    let records = (1..=30)
        .map(|idx| {
            let id = format!("SKU{idx}");
            if idx % 3 == 0 { invalid_record(&id) } else { product_record(&id) }
        })
        .collect::<Vec<_>>();
    let opts = options(PipelineConfig::default());
    let first = validate_records(&records, &definition, &opts, None, None);
    let second = validate_records(&records, &definition, &opts, None, None);
    assert_eq!(first, second);
}

#[test]
fn canonical_name_wins_over_aliases() {
    let definition = openai_product_feed();
    let both = record(json!({"item_id": "CANON", "sku": "ALIAS"}));
    let result = validate_record(1, &both, &definition, None);
    assert_eq!(result.canonical["item_id"], json!("CANON"));
    assert!(!result.canonical.contains_key("sku"));

    let blank_canonical = record(json!({"item_id": " ", "id": "FIRST", "sku": "LATER"}));
    let result = validate_record(1, &blank_canonical, &definition, None);
    assert_eq!(result.canonical["item_id"], json!("FIRST"));
}

#[test]
fn unknown_columns_pass_through() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("warehouse_bin".into(), json!("B-12"));
    let result = validate_record(1, &raw, &definition, None);
    assert!(result.is_valid);
    assert_eq!(result.data.expect("typed")["warehouse_bin"], json!("B-12"));
}

#[test]
fn raw_issues_deduplicate_across_rows() {
    let definition = openai_product_feed();
    let records = (1..=3)
        .map(|idx| {
            let mut raw = product_record(&format!("SKU{idx}"));
            let title = raw.remove("title").expect("title");
            raw.insert("product_name".into(), title);
            raw
        })
        .collect::<Vec<_>>();
    let outcome = validate_records(&records, &definition, &ValidateOptions::default(), None, None);

    let renames = outcome
        .raw_issues
        .iter()
        .filter(|issue| issue.field == "title")
        .collect::<Vec<_>>();
    assert_eq!(renames.len(), 1);
    assert_eq!(renames[0].count, 3);
    assert_eq!(renames[0].row, 1);
    assert_eq!(renames[0].message, "column 'product_name' will be renamed to 'title'");
    let availability = outcome
        .raw_issues
        .iter()
        .find(|issue| issue.field == "availability")
        .expect("availability finding");
    assert_eq!(availability.message, "availability standardized");
    assert_eq!(availability.count, 3);
}

#[test]
fn alias_rename_is_reported_for_fields_without_rules() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("images".into(), json!("https://shop.example.com/img/a.jpg"));
    let outcome = validate_records(&[raw], &definition, &options(PipelineConfig::default()), None, None);
    let rename = outcome
        .raw_issues
        .iter()
        .find(|issue| issue.field == "additional_image_link")
        .expect("rename finding");
    assert_eq!(
        rename.message,
        "column 'images' will be renamed to 'additional_image_link'"
    );
    assert_eq!(
        outcome.summary.valid_records[0]["additional_image_link"],
        json!("https://shop.example.com/img/a.jpg")
    );
}

#[test]
fn out_of_range_float_quantity_is_rejected() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("inventory_quantity".into(), json!(1e300));
    let result = validate_record(1, &raw, &definition, None);
    assert!(!result.is_valid);
    assert!(result.data.is_none());
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].field, "inventory_quantity");
    assert_eq!(result.issues[0].message, "must be a whole number");
}

#[test]
fn undecodable_gzip_jsonl_line_is_a_parse_error() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("feed.jsonl.gz");
    let mut encoder = GzEncoder::new(File::create(&path).expect("create"), Compression::default());
    encoder
        .write_all(b"{\"title\":\"Caf\xe9\"}\n")
        .expect("write gzip");
    encoder.finish().expect("finish gzip");
    let registry = ValidatorRegistry::builtin();
    let err = pipeline::validate_file(&path, &registry, "openai", &ValidateOptions::default(), None, None)
        .expect_err("invalid UTF-8");
    assert!(matches!(err, FeedError::Parse { line: 1, .. }), "got {err:?}");
}

#[test]
fn raw_issue_scan_is_limited_to_preview_rows() {
    let definition = openai_product_feed();
    let records = (1..=10)
        .map(|idx| product_record(&format!("SKU{idx}")))
        .collect::<Vec<_>>();
    let config = PipelineConfig {
        raw_issue_preview_rows: 4,
        max_raw_issues: 1,
        ..PipelineConfig::default()
    };
    let outcome = validate_records(&records, &definition, &options(config), None, None);
    assert_eq!(outcome.raw_issues.len(), 1);
    assert_eq!(outcome.raw_issues[0].count, 4);
}

#[test]
fn loopback_urls_are_flagged_without_failing_rows() {
    let definition = openai_product_feed();
    let mut raw = product_record("A1");
    raw.insert("seller_url".into(), json!("http://localhost:8080"));
    let outcome = validate_records(&[raw], &definition, &ValidateOptions::default(), None, None);
    assert!(outcome.success);
    let finding = outcome
        .raw_issues
        .iter()
        .find(|issue| issue.field == "seller_url")
        .expect("loopback finding");
    assert_eq!(finding.severity, Severity::Warning);
}

#[test]
fn precheck_reports_as_is_state_without_retaining() {
    let definition = openai_product_feed();
    let outcome = precheck_records(
        &[product_record("A1"), product_record("A2")],
        &definition,
        &options(PipelineConfig::default()),
        None,
        None,
    );
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.summary.invalid_rows, 2);
    assert!(!outcome.success);
    assert!(outcome.summary.valid_records.is_empty());
    assert!(
        outcome
            .summary
            .issues
            .iter()
            .any(|issue| issue.field == "availability")
    );
}

#[test]
fn gzip_csv_validates_end_to_end() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_gz("feed.csv.gz", &product_csv(3));
    let registry = ValidatorRegistry::builtin();
    let outcome = pipeline::validate_file(
        &path,
        &registry,
        "openai",
        &options(PipelineConfig::default()),
        None,
        None,
    )
    .expect("validate gzip feed");
    assert_eq!(outcome.format, Some(FeedFormat::Csv));
    assert_eq!(outcome.summary.total_rows, 3);
    assert_eq!(outcome.summary.valid_rows, 3);
    assert_eq!(outcome.summary.valid_records[2]["item_id"], json!("SKU3"));
}

#[test]
fn byte_order_mark_does_not_leak_into_headers() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("feed.csv", &format!("\u{feff}{}", product_csv(1)));
    let registry = ValidatorRegistry::builtin();
    let outcome = pipeline::validate_file(&path, &registry, "openai", &ValidateOptions::default(), None, None)
        .expect("validate feed");
    assert!(outcome.success, "issues: {:?}", outcome.summary.issues);
}

#[test]
fn jsonl_feed_keeps_native_types() {
    let workspace = TestWorkspace::new();
    let mut line = product_record("J1");
    line.insert("inventory_quantity".into(), json!(12));
    line.insert("is_eligible_search".into(), json!(false));
    let contents = format!("{}\n\n", serde_json::to_string(&line).expect("serialize"));
    let path = workspace.write("feed.ndjson", &contents);
    let registry = ValidatorRegistry::builtin();
    let outcome = pipeline::validate_file(
        &path,
        &registry,
        "openai",
        &options(PipelineConfig::default()),
        None,
        None,
    )
    .expect("validate jsonl feed");
    assert_eq!(outcome.format, Some(FeedFormat::Jsonl));
    assert_eq!(outcome.summary.total_rows, 1);
    let data = &outcome.summary.valid_records[0];
    assert_eq!(data["inventory_quantity"], json!(12));
    assert_eq!(data["is_eligible_search"], json!(false));
}

#[test]
fn unknown_validator_is_rejected_before_reading() {
    let workspace = TestWorkspace::new();
    let missing = workspace.path().join("absent.csv");
    let registry = ValidatorRegistry::builtin();
    let err = pipeline::validate_file(&missing, &registry, "amazon", &ValidateOptions::default(), None, None)
        .expect_err("unknown validator");
    assert!(matches!(err, FeedError::UnknownValidator { .. }));
    assert!(err.to_string().contains("openai, google"));
}

#[test]
fn unsupported_format_is_rejected_before_processing() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("feed.jsonl", "{\"id\": \"A1\"}\n");
    let registry = ValidatorRegistry::builtin();
    let mut calls = 0;
    let mut on_progress = |_: &ProgressSnapshot| calls += 1;
    let err = pipeline::validate_file(
        &path,
        &registry,
        "google",
        &ValidateOptions::default(),
        Some(&mut on_progress),
        None,
    )
    .expect_err("jsonl not accepted by google");
    assert!(matches!(err, FeedError::FormatNotSupported { .. }));
    assert_eq!(calls, 0);
}

#[test]
fn input_errors_surface_as_feed_errors() {
    let workspace = TestWorkspace::new();
    let registry = ValidatorRegistry::builtin();
    let opts = ValidateOptions::default();

    let unsupported = workspace.write("feed.xlsx", "");
    let err = pipeline::validate_file(&unsupported, &registry, "openai", &opts, None, None).expect_err("xlsx");
    assert!(matches!(err, FeedError::UnsupportedFormat { .. }));

    let fake_gz = workspace.write("feed.csv.gz", &product_csv(1));
    let err = pipeline::validate_file(&fake_gz, &registry, "openai", &opts, None, None).expect_err("not gzip");
    assert!(matches!(err, FeedError::Decompression { .. }));
    assert!(err.is_input_error());

    let ragged = workspace.write("ragged.csv", "item_id,title\nA1,Widget,extra\n");
    let err = pipeline::validate_file(&ragged, &registry, "openai", &opts, None, None).expect_err("ragged");
    assert!(matches!(err, FeedError::Parse { line: 2, .. }));

    let not_object = workspace.write("feed.jsonl", "{\"item_id\": \"A1\"}\n[1, 2]\n");
    let err = pipeline::validate_file(&not_object, &registry, "openai", &opts, None, None).expect_err("array line");
    assert!(matches!(err, FeedError::Parse { line: 2, .. }));
}

proptest! {
    #[test]
    fn counters_and_caps_hold_for_any_mix(
        validity in prop::collection::vec(any::<bool>(), 0..40),
        chunk_size in 1usize..8,
        max_issues in 0usize..6,
        max_valid_records in 0usize..6,
    ) {
        let definition = openai_product_feed();
        let records = validity
            .iter()
            .enumerate()
            .map(|(idx, valid)| {
                let id = format!("SKU{idx}");
                if *valid { product_record(&id) } else { invalid_record(&id) }
            })
            .collect::<Vec<_>>();
        let config = PipelineConfig {
            chunk_size,
            max_issues,
            max_valid_records,
            ..PipelineConfig::default()
        };
        let mut snapshots = Vec::new();
        let mut on_progress = |snapshot: &ProgressSnapshot| snapshots.push(*snapshot);
        let outcome = validate_records(&records, &definition, &options(config), Some(&mut on_progress), None);

        let expected_valid = validity.iter().filter(|valid| **valid).count();
        let summary = &outcome.summary;
        prop_assert_eq!(summary.processed_rows, records.len());
        prop_assert_eq!(summary.valid_rows, expected_valid);
        prop_assert_eq!(summary.invalid_rows, records.len() - expected_valid);
        prop_assert!(summary.issues.len() <= max_issues);
        prop_assert!(summary.valid_records.len() <= max_valid_records);
        prop_assert_eq!(outcome.issues_truncated, summary.error_count > max_issues);
        prop_assert_eq!(outcome.records_truncated, expected_valid > max_valid_records);
        prop_assert_eq!(outcome.success, expected_valid == records.len());
        for snapshot in &snapshots {
            prop_assert_eq!(snapshot.processed_rows, snapshot.valid_rows + snapshot.invalid_rows);
        }
        prop_assert_eq!(snapshots.len(), 2 + records.len() / chunk_size);
    }
}
