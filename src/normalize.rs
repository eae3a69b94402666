//! Per-field value normalizers.
//!
//! Every normalizer is pure, total over JSON scalars, and idempotent:
//! applying it to an already-canonical value returns that value unchanged.
//! Values a normalizer does not recognise are returned as-is so the schema
//! validator can report them.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value};

use crate::data::parse_bool_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationKind {
    Price,
    Availability,
    ReturnWindow,
    Condition,
    Boolean,
    Generic,
}

impl NormalizationKind {
    /// Operator-facing description of what the transform repairs.
    pub fn describe(&self) -> &'static str {
        match self {
            NormalizationKind::Price => "price format corrected",
            NormalizationKind::Availability => "availability standardized",
            NormalizationKind::ReturnWindow => "return window units stripped",
            NormalizationKind::Condition => "condition value translated",
            NormalizationKind::Boolean => "boolean value coerced",
            NormalizationKind::Generic => "value normalized",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldNormalizer {
    pub kind: NormalizationKind,
    pub apply: fn(&Value) -> Value,
}

impl FieldNormalizer {
    pub const fn new(kind: NormalizationKind, apply: fn(&Value) -> Value) -> Self {
        Self { kind, apply }
    }

    pub fn normalize(&self, value: &Value) -> Value {
        (self.apply)(value)
    }
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z]{3})?\s*([0-9][0-9.,]*)\s*([A-Za-z]{3})?$").expect("valid price regex")
    })
}

/// Rewrites `19,99 eur`, `EUR 19.99` or `1.299,00EUR` into `<amount> <CUR>`.
pub fn normalize_price(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.trim(),
        Value::Number(n) => return Value::String(n.to_string()),
        other => return other.clone(),
    };
    let Some(captures) = price_pattern().captures(text) else {
        return value.clone();
    };
    let currency = match (captures.get(1), captures.get(3)) {
        (Some(_), Some(_)) => return value.clone(),
        (Some(cur), None) | (None, Some(cur)) => Some(cur.as_str().to_ascii_uppercase()),
        (None, None) => None,
    };
    let Some(amount) = normalize_amount(&captures[2]) else {
        return value.clone();
    };
    match currency {
        Some(currency) => Value::String(format!("{amount} {currency}")),
        None => Value::String(amount),
    }
}

fn normalize_amount(raw: &str) -> Option<String> {
    let last_dot = raw.rfind('.');
    let last_comma = raw.rfind(',');
    let (decimal_sep, group_sep) = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if dot > comma => (Some('.'), Some(',')),
        (Some(_), Some(_)) => (Some(','), Some('.')),
        (None, Some(comma)) => {
            let fraction = raw.len() - comma - 1;
            if raw.matches(',').count() == 1 && fraction != 3 {
                (Some(','), None)
            } else {
                (None, Some(','))
            }
        }
        (Some(_), None) => (Some('.'), None),
        (None, None) => (None, None),
    };
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if Some(c) == group_sep {
            continue;
        }
        if Some(c) == decimal_sep {
            out.push('.');
        } else {
            out.push(c);
        }
    }
    if out.matches('.').count() > 1 || out.ends_with('.') {
        return None;
    }
    Some(out)
}

/// Maps free-text stock states onto `in_stock`, `out_of_stock`, `preorder`
/// or `backorder`; unknown text is lowercased and underscored.
pub fn normalize_availability(value: &Value) -> Value {
    let token = match value {
        Value::String(s) => s.trim().to_lowercase().replace([' ', '-'], "_"),
        Value::Bool(true) => return Value::String("in_stock".into()),
        Value::Bool(false) => return Value::String("out_of_stock".into()),
        other => return other.clone(),
    };
    let canonical = match token.as_str() {
        "in_stock" | "instock" | "available" | "yes" | "true" | "1" | "in_store_only" => "in_stock",
        "out_of_stock" | "outofstock" | "sold_out" | "soldout" | "unavailable" | "no"
        | "false" | "0" | "discontinued" => "out_of_stock",
        "preorder" | "pre_order" | "pre_sale" | "presale" => "preorder",
        "backorder" | "back_order" | "backordered" => "backorder",
        _ => return Value::String(token),
    };
    Value::String(canonical.to_string())
}

/// Translates localized condition labels into `new`, `used` or `refurbished`.
pub fn normalize_condition(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let lowered = s.trim().to_lowercase();
    let canonical = match lowered.as_str() {
        "new" | "brand new" | "neu" | "nuevo" | "nueva" | "neuf" | "neuve" | "nuovo" => "new",
        "used" | "pre-owned" | "preowned" | "second hand" | "gebraucht" | "usado" | "usada"
        | "occasion" | "d'occasion" | "usato" => "used",
        "refurbished" | "renewed" | "remanufactured" | "generalüberholt" | "reconditionné"
        | "reacondicionado" | "ricondizionato" => "refurbished",
        _ => return Value::String(lowered),
    };
    Value::String(canonical.to_string())
}

fn return_window_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)\s*(days?|d|tage?|jours?|días|dias)?$").expect("valid window regex")
    })
}

/// Strips day units from a return window and yields an integer.
pub fn normalize_return_window(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    match return_window_pattern()
        .captures(s.trim())
        .and_then(|captures| captures[1].parse::<u64>().ok())
    {
        Some(days) => Value::Number(Number::from(days)),
        None => value.clone(),
    }
}

pub fn normalize_boolean(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_bool_token(s).map(Value::Bool).unwrap_or_else(|| value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Value::Bool(true),
            Some(0) => Value::Bool(false),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

pub fn trim_text(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().len() != s.len() => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Removes spaces and hyphens from barcodes; numeric barcodes become strings.
pub fn normalize_gtin(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.chars().filter(|c| !matches!(c, ' ' | '-')).collect()),
        Value::Number(n) if n.is_u64() => Value::String(n.to_string()),
        other => other.clone(),
    }
}

pub fn uppercase_code(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_ascii_uppercase()),
        other => other.clone(),
    }
}

/// Uppercases a comma/semicolon separated list of country codes.
pub fn normalize_country_list(value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let codes = s
        .split([',', ';'])
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect::<Vec<_>>();
    Value::String(codes.join(","))
}

pub fn integer_from_text(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(Number::from(n)))
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

pub const PRICE: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Price, normalize_price);
pub const AVAILABILITY: FieldNormalizer =
    FieldNormalizer::new(NormalizationKind::Availability, normalize_availability);
pub const CONDITION: FieldNormalizer =
    FieldNormalizer::new(NormalizationKind::Condition, normalize_condition);
pub const RETURN_WINDOW: FieldNormalizer =
    FieldNormalizer::new(NormalizationKind::ReturnWindow, normalize_return_window);
pub const BOOLEAN: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Boolean, normalize_boolean);
pub const TRIM: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Generic, trim_text);
pub const GTIN: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Generic, normalize_gtin);
pub const CODE: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Generic, uppercase_code);
pub const COUNTRY_LIST: FieldNormalizer =
    FieldNormalizer::new(NormalizationKind::Generic, normalize_country_list);
pub const INTEGER: FieldNormalizer = FieldNormalizer::new(NormalizationKind::Generic, integer_from_text);
