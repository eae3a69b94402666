use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row: usize,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ValidationIssue {
    pub fn error(row: usize, field: &str, message: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            row,
            field: field.to_string(),
            message: message.into(),
            severity: Severity::Error,
            value,
        }
    }
}

/// An advisory finding, collapsed across rows that share field and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIssue {
    /// Row of the first occurrence.
    pub row: usize,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Value>,
    pub count: usize,
}

/// Deduplicates raw issues by `(field, message)` and keeps at most `capacity`
/// distinct entries. Repeats of a retained entry only bump its count.
#[derive(Debug, Clone)]
pub struct RawIssueCollector {
    capacity: usize,
    issues: Vec<RawIssue>,
    index: HashMap<(String, String), usize>,
    dropped: usize,
}

impl RawIssueCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            issues: Vec::new(),
            index: HashMap::new(),
            dropped: 0,
        }
    }

    pub fn record(&mut self, issue: RawIssue) {
        let key = (issue.field.clone(), issue.message.clone());
        if let Some(&position) = self.index.get(&key) {
            self.issues[position].count += 1;
            return;
        }
        if self.issues.len() >= self.capacity {
            self.dropped += 1;
            return;
        }
        self.index.insert(key, self.issues.len());
        self.issues.push(RawIssue { count: 1, ..issue });
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Occurrences of distinct issues that did not fit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_issues(self) -> Vec<RawIssue> {
        self.issues
    }
}
