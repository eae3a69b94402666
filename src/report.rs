//! Plain-text rendering of validation outcomes for the terminal.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    data::value_as_text,
    pipeline::{RunState, ValidationOutcome},
};

const MAX_CELL_WIDTH: usize = 48;

fn clip_cell(value: &str) -> String {
    let flattened = value
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect::<String>();
    if flattened.chars().count() <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut clipped = flattened.chars().take(MAX_CELL_WIDTH - 3).collect::<String>();
    clipped.push_str("...");
    clipped
}

/// Aligned columns separated by two spaces, with a dashed rule under the header.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|cell| clip_cell(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let mut widths = headers.iter().map(|h| h.chars().count().max(3)).collect::<Vec<_>>();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().copied(), &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(rule.iter().map(String::as_str), &widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row.iter().map(String::as_str), &widths));
    }
    output
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .join("  ")
        .trim_end()
        .to_string()
}

pub fn render_outcome(outcome: &ValidationOutcome) -> String {
    let summary = &outcome.summary;
    let mut output = String::new();
    let state = match outcome.state {
        RunState::Completed if outcome.success => "passed",
        RunState::Completed => "failed",
        RunState::Cancelled => "cancelled",
        RunState::Initializing | RunState::Processing => "incomplete",
    };
    let _ = writeln!(
        output,
        "Validator {} v{}: {state}",
        outcome.validator, outcome.validator_version
    );
    let _ = writeln!(
        output,
        "Rows: {} processed of {} ({} valid, {} invalid); {} error(s), {} warning(s)",
        summary.processed_rows,
        summary.total_rows,
        summary.valid_rows,
        summary.invalid_rows,
        summary.error_count,
        summary.warning_count
    );

    if !outcome.raw_issues.is_empty() {
        let _ = writeln!(output, "\nInput observations:");
        let rows = outcome
            .raw_issues
            .iter()
            .map(|issue| {
                vec![
                    issue.row.to_string(),
                    issue.severity.to_string(),
                    issue.field.clone(),
                    issue.message.clone(),
                    issue.count.to_string(),
                ]
            })
            .collect::<Vec<_>>();
        output.push_str(&render_table(&["first_row", "severity", "field", "message", "count"], &rows));
    }

    if !summary.issues.is_empty() {
        let _ = writeln!(output, "\nValidation issues:");
        let rows = summary
            .issues
            .iter()
            .map(|issue| {
                vec![
                    issue.row.to_string(),
                    issue.field.clone(),
                    issue.message.clone(),
                    issue.value.as_ref().map(value_as_text).unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>();
        output.push_str(&render_table(&["row", "field", "message", "value"], &rows));
        if outcome.issues_truncated {
            let _ = writeln!(
                output,
                "({} of {} issue(s) shown)",
                summary.issues.len(),
                summary.error_count + summary.warning_count
            );
        }
    }
    output
}
