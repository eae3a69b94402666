//! Advisory findings that explain what reconciliation will change.
//!
//! Nothing here affects whether a record is valid. The pipeline runs the
//! detector over a bounded prefix of rows and feeds the findings into a
//! [`RawIssueCollector`](crate::issues::RawIssueCollector).

use serde_json::Value;

use crate::{
    data::{Record, coerce_i64, non_empty, parse_bool_token},
    issues::{RawIssue, Severity},
    normalize::NormalizationKind,
    validators::ValidatorDefinition,
};

pub const MIN_RETURN_WINDOW_DAYS: i64 = 7;
const RETURN_WINDOW_FIELD: &str = "return_window";
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

fn issue(
    row: usize,
    field: &str,
    message: String,
    severity: Severity,
    value: &Value,
    resolved: Option<Value>,
) -> RawIssue {
    RawIssue {
        row,
        field: field.to_string(),
        message,
        severity,
        value: Some(value.clone()),
        resolved,
        count: 1,
    }
}

fn has_loopback_host(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    let after_scheme = lowered.split_once("://").map_or(lowered.as_str(), |(_, rest)| rest);
    let authority = after_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    LOOPBACK_HOSTS.iter().any(|loopback| {
        host == *loopback
            || host
                .strip_prefix(loopback)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Canonical fields the definition knows about: rule order first, then
/// normalized and aliased fields without a rule.
fn canonical_fields(definition: &ValidatorDefinition) -> Vec<&str> {
    let mut fields = definition
        .rules
        .fields()
        .iter()
        .map(|rule| rule.name.as_str())
        .collect::<Vec<_>>();
    let extra = definition
        .normalizers
        .keys()
        .map(String::as_str)
        .chain(definition.aliases.iter().map(|(name, _)| name));
    for name in extra {
        if !fields.contains(&name) {
            fields.push(name);
        }
    }
    fields
}

/// Findings for one record. With `resolve_aliases` false the record is taken
/// to be already mapped onto canonical names, so no rename is reported.
pub fn detect_raw_issues(
    row: usize,
    record: &Record,
    definition: &ValidatorDefinition,
    resolve_aliases: bool,
) -> Vec<RawIssue> {
    let mut found = Vec::new();
    for field in canonical_fields(definition) {
        let located = if resolve_aliases {
            definition.aliases.lookup(record, field)
        } else {
            non_empty(record, field).map(|value| (field, value))
        };
        let Some((source, value)) = located else {
            continue;
        };

        if source != field {
            found.push(issue(
                row,
                field,
                format!("column '{source}' will be renamed to '{field}'"),
                Severity::Info,
                value,
                None,
            ));
        }

        let mut boolean_reported = false;
        if definition.is_boolean_field(field)
            && let Value::String(text) = value
            && let Some(resolved) = parse_bool_token(text)
        {
            found.push(issue(
                row,
                field,
                "boolean-like text will be converted to a boolean".to_string(),
                Severity::Info,
                value,
                Some(Value::Bool(resolved)),
            ));
            boolean_reported = true;
        }

        if definition.is_url_field(field)
            && let Value::String(url) = value
            && has_loopback_host(url)
        {
            found.push(issue(
                row,
                field,
                "URL points to a loopback host and will not be reachable".to_string(),
                Severity::Warning,
                value,
                None,
            ));
        }

        let normalizer = definition.normalizers.get(field);
        let normalized = normalizer.map(|n| n.normalize(value));

        if field == RETURN_WINDOW_FIELD
            && let Some(days) = coerce_i64(normalized.as_ref().unwrap_or(value))
            && days < MIN_RETURN_WINDOW_DAYS
        {
            found.push(issue(
                row,
                field,
                format!("return window of fewer than {MIN_RETURN_WINDOW_DAYS} days looks suspicious"),
                Severity::Warning,
                value,
                None,
            ));
        }

        if let (Some(normalizer), Some(normalized)) = (normalizer, normalized)
            && normalized != *value
            && !(boolean_reported && normalizer.kind == NormalizationKind::Boolean)
        {
            found.push(issue(
                row,
                field,
                normalizer.kind.describe().to_string(),
                Severity::Info,
                value,
                Some(normalized),
            ));
        }
    }
    found
}
