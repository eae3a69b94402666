//! Alias resolution, default injection, and normalization.
//!
//! [`reconcile`] turns one raw record into a canonical record in four fixed
//! steps: canonical-or-first-alias lookup, pass-through of unknown columns,
//! default injection, then normalization. Later steps rely on the earlier
//! ones, so the order must not change.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::{
    data::{Record, is_empty_value, non_empty},
    normalize::FieldNormalizer,
};

/// Canonical field name to its accepted alternate source names, in lookup order.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<(String, Vec<String>)>,
    reverse: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, canonical: &str, aliases: &[&str]) -> Self {
        self.insert(canonical, aliases.iter().map(|alias| alias.to_string()).collect());
        self
    }

    pub fn insert(&mut self, canonical: &str, aliases: Vec<String>) {
        for alias in &aliases {
            self.reverse
                .entry(alias.clone())
                .or_insert_with(|| canonical.to_string());
        }
        match self.entries.iter_mut().find(|(name, _)| name == canonical) {
            Some((_, existing)) => existing.extend(aliases),
            None => self.entries.push((canonical.to_string(), aliases)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, aliases)| (name.as_str(), aliases.as_slice()))
    }

    pub fn aliases_for(&self, canonical: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| name == canonical)
            .map(|(_, aliases)| aliases.as_slice())
            .unwrap_or_default()
    }

    /// Canonical field a source name is a declared alias of, if any.
    pub fn canonical_for_alias(&self, source: &str) -> Option<&str> {
        self.reverse.get(source).map(String::as_str)
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        self.entries.iter().any(|(canonical, _)| canonical == name)
    }

    /// First non-empty value for `canonical`, with the source name it came from.
    pub fn lookup<'a>(&'a self, raw: &'a Record, canonical: &'a str) -> Option<(&'a str, &'a Value)> {
        if let Some(value) = non_empty(raw, canonical) {
            return Some((canonical, value));
        }
        self.aliases_for(canonical)
            .iter()
            .find_map(|alias| non_empty(raw, alias).map(|value| (alias.as_str(), value)))
    }
}

pub type NormalizerTable = BTreeMap<String, FieldNormalizer>;

/// Constants substituted for canonical fields that are still missing.
#[derive(Debug, Clone, Default)]
pub struct DefaultTable {
    entries: Vec<(String, Value)>,
}

impl DefaultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.entries.retain(|(name, _)| name != field);
        self.entries.push((field.to_string(), value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

/// Explicit source-to-canonical renames supplied by the caller.
pub type FieldMapping = BTreeMap<String, String>;

/// Steps 1 and 2: canonical-or-first-alias lookup, then unknown-column pass-through.
pub fn resolve_aliases(raw: &Record, aliases: &AliasTable) -> Record {
    let mut canonical = Record::new();
    for (name, _) in aliases.iter() {
        if let Some((_, value)) = aliases.lookup(raw, name) {
            canonical.insert(name.to_string(), value.clone());
        }
    }
    for (name, value) in raw {
        if aliases.is_canonical(name) || aliases.canonical_for_alias(name).is_some() {
            continue;
        }
        canonical.insert(name.clone(), value.clone());
    }
    canonical
}

/// Renames every raw field that has a mapping entry and passes the rest
/// through. Where several sources land on one name the first non-empty wins.
pub fn apply_field_mapping(raw: &Record, mapping: &FieldMapping) -> Record {
    let mut mapped = Record::new();
    for (name, value) in raw {
        let target = mapping.get(name).unwrap_or(name);
        match mapped.get_mut(target) {
            Some(existing) if is_empty_value(existing) && !is_empty_value(value) => {
                *existing = value.clone();
            }
            Some(_) => {}
            None => {
                mapped.insert(target.clone(), value.clone());
            }
        }
    }
    mapped
}

/// Step 3.
pub fn inject_defaults(record: &mut Record, defaults: &DefaultTable) {
    for (field, value) in defaults.iter() {
        match record.get_mut(field) {
            Some(existing) if is_empty_value(existing) => *existing = value.clone(),
            Some(_) => {}
            None => {
                record.insert(field.to_string(), value.clone());
            }
        }
    }
}

/// Step 4. Empty values are left for the validator to report as missing.
pub fn apply_normalizers(record: &mut Record, normalizers: &NormalizerTable) {
    for (field, value) in record.iter_mut() {
        if is_empty_value(value) {
            continue;
        }
        if let Some(normalizer) = normalizers.get(field) {
            *value = normalizer.normalize(value);
        }
    }
}

pub fn reconcile(
    raw: &Record,
    aliases: &AliasTable,
    normalizers: &NormalizerTable,
    defaults: &DefaultTable,
) -> Record {
    let mut canonical = resolve_aliases(raw, aliases);
    inject_defaults(&mut canonical, defaults);
    apply_normalizers(&mut canonical, normalizers);
    canonical
}

/// Like [`reconcile`] but with an explicit mapping in place of alias resolution.
pub fn reconcile_mapped(
    raw: &Record,
    mapping: &FieldMapping,
    normalizers: &NormalizerTable,
    defaults: &DefaultTable,
) -> Record {
    let mut canonical = apply_field_mapping(raw, mapping);
    inject_defaults(&mut canonical, defaults);
    apply_normalizers(&mut canonical, normalizers);
    canonical
}
