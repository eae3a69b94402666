//! Declarative schema rules applied to canonical records.
//!
//! A [`RuleSet`] is a list of per-field constraint descriptors plus cross-field
//! predicates. It is built once per validator definition and reused for every
//! record. Validation never fails outright: each violated rule yields exactly
//! one error-severity [`ValidationIssue`].

use std::{collections::HashSet, fmt, sync::OnceLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::{
    data::{Record, coerce_bool, coerce_f64, coerce_i64, is_empty_value, parse_iso_date, parse_money, value_as_text},
    issues::{Severity, ValidationIssue},
};

const COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

const CURRENCY_CODES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK", "EGP", "EUR",
    "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KRW", "MAD", "MXN", "MYR", "NGN", "NOK",
    "NZD", "PEN", "PHP", "PKR", "PLN", "QAR", "RON", "RSD", "SAR", "SEK", "SGD", "THB", "TRY", "TWD",
    "UAH", "USD", "VND", "ZAR",
];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://[A-Za-z0-9](?:[A-Za-z0-9\-._~%]*[A-Za-z0-9])?(?::\d{1,5})?(?:[/?#][^\s]*)?$")
            .expect("valid url regex")
    })
}

pub fn is_country_code(code: &str) -> bool {
    COUNTRY_CODES.binary_search(&code).is_ok()
}

pub fn is_currency_code(code: &str) -> bool {
    CURRENCY_CODES.binary_search(&code).is_ok()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text { min: usize, max: usize },
    Url,
    Enum(Vec<String>),
    Integer { min: i64, max: Option<i64> },
    Number { min: f64 },
    Boolean,
    Date,
    CountryCode,
    CountryList,
    CurrencyCode,
    Price,
    Gtin,
}

impl FieldKind {
    pub fn text(max: usize) -> Self {
        FieldKind::Text { min: 1, max }
    }

    pub fn one_of(values: &[&str]) -> Self {
        FieldKind::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// Checks `value` and returns its typed form.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        match self {
            FieldKind::Text { min, max } => {
                let text = scalar_text(value).ok_or("must be text")?;
                let length = text.chars().count();
                if length < *min {
                    return Err(format!("must be at least {min} characters"));
                }
                if length > *max {
                    return Err(format!("must be at most {max} characters (found {length})"));
                }
                Ok(Value::String(text))
            }
            FieldKind::Url => {
                let text = scalar_text(value).ok_or("must be a URL")?;
                if url_pattern().is_match(&text) {
                    Ok(Value::String(text))
                } else {
                    Err("must be a well-formed http(s) URL".to_string())
                }
            }
            FieldKind::Enum(values) => {
                let text = scalar_text(value).ok_or("must be text")?;
                if values.iter().any(|candidate| *candidate == text) {
                    Ok(Value::String(text))
                } else {
                    Err(format!("must be one of: {}", values.join(", ")))
                }
            }
            FieldKind::Integer { min, max } => {
                let parsed = coerce_i64(value).ok_or("must be a whole number")?;
                if parsed < *min {
                    return Err(format!("must be at least {min}"));
                }
                if let Some(max) = max
                    && parsed > *max
                {
                    return Err(format!("must be at most {max}"));
                }
                Ok(Value::Number(Number::from(parsed)))
            }
            FieldKind::Number { min } => {
                let parsed = coerce_f64(value).ok_or("must be a number")?;
                if parsed < *min {
                    return Err(format!("must be at least {min}"));
                }
                Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| "must be a finite number".to_string())
            }
            FieldKind::Boolean => coerce_bool(value)
                .map(Value::Bool)
                .ok_or_else(|| "must be true or false".to_string()),
            FieldKind::Date => {
                let text = scalar_text(value).ok_or("must be an ISO 8601 date")?;
                parse_iso_date(&text)
                    .map(|_| Value::String(text))
                    .ok_or_else(|| "must be an ISO 8601 date (YYYY-MM-DD)".to_string())
            }
            FieldKind::CountryCode => {
                let text = scalar_text(value).ok_or("must be a country code")?;
                if is_country_code(&text) {
                    Ok(Value::String(text))
                } else {
                    Err("must be an ISO 3166-1 alpha-2 country code".to_string())
                }
            }
            FieldKind::CountryList => {
                let text = scalar_text(value).ok_or("must be a list of country codes")?;
                let invalid = text
                    .split(',')
                    .map(str::trim)
                    .filter(|code| !is_country_code(code))
                    .collect::<Vec<_>>();
                if invalid.is_empty() {
                    Ok(Value::String(text))
                } else {
                    Err(format!("contains invalid country code(s): {}", invalid.join(", ")))
                }
            }
            FieldKind::CurrencyCode => {
                let text = scalar_text(value).ok_or("must be a currency code")?;
                if is_currency_code(&text) {
                    Ok(Value::String(text))
                } else {
                    Err("must be an ISO 4217 currency code".to_string())
                }
            }
            FieldKind::Price => {
                let text = scalar_text(value).ok_or("must be a price")?;
                let money = parse_money(&text)
                    .ok_or("must be an amount followed by a currency code, e.g. '19.99 USD'")?;
                if money.amount.is_sign_negative() {
                    return Err("must not be negative".to_string());
                }
                if !is_currency_code(&money.currency) {
                    return Err(format!("uses unknown currency '{}'", money.currency));
                }
                Ok(Value::String(text))
            }
            FieldKind::Gtin => {
                let text = scalar_text(value).ok_or("must be a GTIN")?;
                if (8..=14).contains(&text.len()) && text.chars().all(|c| c.is_ascii_digit()) {
                    Ok(Value::String(text))
                } else {
                    Err("must be 8 to 14 digits".to_string())
                }
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(value_as_text(value)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldRule {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            kind,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            kind,
        }
    }
}

/// Predicate over a typed record; `Some(message)` reports a violation.
pub type CrossFieldCheck = fn(&Record) -> Option<String>;

#[derive(Clone)]
pub struct CrossFieldRule {
    /// Field the issue is reported against.
    pub field: String,
    /// Fields whose field-level checks must pass before this rule runs.
    pub depends_on: Vec<String>,
    pub check: CrossFieldCheck,
}

impl CrossFieldRule {
    pub fn new(field: &str, depends_on: &[&str], check: CrossFieldCheck) -> Self {
        Self {
            field: field.to_string(),
            depends_on: depends_on.iter().map(|f| f.to_string()).collect(),
            check,
        }
    }
}

impl fmt::Debug for CrossFieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossFieldRule")
            .field("field", &self.field)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: Vec<FieldRule>,
    cross: Vec<CrossFieldRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    /// Typed record, present only when valid.
    pub data: Option<Record>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn cross(mut self, rule: CrossFieldRule) -> Self {
        self.cross.push(rule);
        self
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn rule_for(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.name == name)
    }

    pub fn validate(&self, row: usize, record: &Record) -> Validation {
        let mut issues = Vec::new();
        let mut typed = record.clone();
        let mut failed: HashSet<&str> = HashSet::new();

        for rule in &self.fields {
            let value = record.get(&rule.name).filter(|value| !is_empty_value(value));
            let Some(value) = value else {
                if rule.required {
                    issues.push(ValidationIssue::error(row, &rule.name, "is required", None));
                    failed.insert(rule.name.as_str());
                }
                continue;
            };
            match rule.kind.coerce(value) {
                Ok(coerced) => {
                    typed.insert(rule.name.clone(), coerced);
                }
                Err(message) => {
                    issues.push(ValidationIssue::error(row, &rule.name, message, Some(value.clone())));
                    failed.insert(rule.name.as_str());
                }
            }
        }

        for rule in &self.cross {
            if rule.depends_on.iter().any(|field| failed.contains(field.as_str())) {
                continue;
            }
            if let Some(message) = (rule.check)(&typed) {
                let value = typed.get(&rule.field).cloned();
                issues.push(ValidationIssue::error(row, &rule.field, message, value));
            }
        }

        let is_valid = !issues.iter().any(|issue| issue.severity == Severity::Error);
        Validation {
            is_valid,
            issues,
            data: is_valid.then_some(typed),
        }
    }
}
