//! Validator definitions and the registry that hands them to the pipeline.
//!
//! A [`ValidatorDefinition`] bundles everything needed to reconcile and
//! validate a feed for one target platform. The [`ValidatorRegistry`] is an
//! ordinary value built at startup; callers pass it by reference.

use serde_json::{Value, json};

use crate::{
    data::{FeedFormat, Record, coerce_bool, non_empty, parse_money},
    error::{FeedError, FeedResult},
    normalize,
    reconcile::{AliasTable, DefaultTable, NormalizerTable},
    rules::{CrossFieldRule, FieldKind, FieldRule, RuleSet},
};

#[derive(Debug, Clone)]
pub struct ValidatorDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    pub formats: Vec<FeedFormat>,
    pub aliases: AliasTable,
    pub normalizers: NormalizerTable,
    pub defaults: DefaultTable,
    pub rules: RuleSet,
}

impl ValidatorDefinition {
    pub fn supports(&self, format: FeedFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn ensure_supports(&self, format: FeedFormat) -> FeedResult<()> {
        if self.supports(format) {
            return Ok(());
        }
        Err(FeedError::FormatNotSupported {
            validator: self.id.clone(),
            format: format.to_string(),
            supported: self.formats.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn is_boolean_field(&self, field: &str) -> bool {
        self.rules
            .rule_for(field)
            .is_some_and(|rule| rule.kind == FieldKind::Boolean)
    }

    pub fn is_url_field(&self, field: &str) -> bool {
        self.rules
            .rule_for(field)
            .is_some_and(|rule| rule.kind == FieldKind::Url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    definitions: Vec<ValidatorDefinition>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in platform definition.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(openai_product_feed());
        registry.register(google_merchant_center());
        registry
    }

    /// Adds a definition, replacing any existing one with the same id.
    pub fn register(&mut self, definition: ValidatorDefinition) {
        self.definitions.retain(|existing| existing.id != definition.id);
        self.definitions.push(definition);
    }

    pub fn ids(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.id.clone()).collect()
    }

    pub fn definitions(&self) -> &[ValidatorDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> FeedResult<&ValidatorDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| FeedError::UnknownValidator {
                id: id.to_string(),
                available: self.ids(),
            })
    }
}

fn is_true(record: &Record, field: &str) -> bool {
    record.get(field).and_then(coerce_bool).unwrap_or(false)
}

fn checkout_requires_terms(record: &Record) -> Option<String> {
    (is_true(record, "is_eligible_checkout") && non_empty(record, "seller_tos").is_none())
        .then(|| "seller_tos is required when is_eligible_checkout is true".to_string())
}

fn checkout_requires_privacy_policy(record: &Record) -> Option<String> {
    (is_true(record, "is_eligible_checkout") && non_empty(record, "seller_privacy_policy").is_none())
        .then(|| "seller_privacy_policy is required when is_eligible_checkout is true".to_string())
}

fn checkout_requires_search(record: &Record) -> Option<String> {
    (is_true(record, "is_eligible_checkout") && !is_true(record, "is_eligible_search"))
        .then(|| "is_eligible_search must be true when is_eligible_checkout is true".to_string())
}

fn preorder_requires_date(record: &Record) -> Option<String> {
    let availability = record.get("availability").and_then(Value::as_str)?;
    (matches!(availability, "preorder" | "backorder") && non_empty(record, "availability_date").is_none())
        .then(|| format!("availability_date is required when availability is {availability}"))
}

fn sale_price_not_above_price(record: &Record) -> Option<String> {
    let price = record.get("price").and_then(Value::as_str).and_then(parse_money)?;
    let sale = record.get("sale_price").and_then(Value::as_str).and_then(parse_money)?;
    if sale.currency != price.currency {
        return Some(format!(
            "sale_price currency {} does not match price currency {}",
            sale.currency, price.currency
        ));
    }
    (sale.amount > price.amount).then(|| format!("sale_price {sale} exceeds price {price}"))
}

fn normalizers(entries: &[(&str, normalize::FieldNormalizer)]) -> NormalizerTable {
    entries
        .iter()
        .map(|(field, normalizer)| (field.to_string(), *normalizer))
        .collect()
}

/// Commerce product feed consumed by conversational shopping surfaces.
pub fn openai_product_feed() -> ValidatorDefinition {
    let aliases = AliasTable::new()
        .with("item_id", &["id", "product_id", "offer_id", "sku"])
        .with("title", &["name", "product_name", "product_title"])
        .with("description", &["desc", "product_description", "body_html"])
        .with("link", &["url", "product_url", "product_link"])
        .with("image_link", &["image", "image_url", "main_image"])
        .with("additional_image_link", &["additional_images", "images"])
        .with("brand", &["manufacturer", "vendor"])
        .with("gtin", &["ean", "upc", "barcode", "isbn"])
        .with("mpn", &["manufacturer_part_number"])
        .with("condition", &["item_condition", "product_condition"])
        .with("product_category", &["category", "google_product_category"])
        .with("price", &["regular_price", "list_price", "price_amount"])
        .with("sale_price", &["special_price", "discount_price"])
        .with("availability", &["stock_status", "availability_status", "in_stock"])
        .with("availability_date", &["available_date", "preorder_date"])
        .with("inventory_quantity", &["quantity", "stock", "qty", "stock_quantity"])
        .with("seller_name", &["store_name", "shop_name", "merchant"])
        .with("seller_url", &["store_url", "shop_url"])
        .with("seller_privacy_policy", &["privacy_policy", "privacy_url"])
        .with("seller_tos", &["terms_of_service", "tos_url", "terms_url"])
        .with("return_policy", &["return_policy_url", "returns_url"])
        .with("return_window", &["return_days", "returns_window"])
        .with("is_eligible_search", &["enable_search", "searchable"])
        .with("is_eligible_checkout", &["enable_checkout", "checkout_enabled"])
        .with("target_countries", &["target_country", "ship_to_countries"])
        .with("store_country", &["country", "merchant_country"]);

    let normalizers = normalizers(&[
        ("item_id", normalize::TRIM),
        ("title", normalize::TRIM),
        ("link", normalize::TRIM),
        ("image_link", normalize::TRIM),
        ("gtin", normalize::GTIN),
        ("condition", normalize::CONDITION),
        ("price", normalize::PRICE),
        ("sale_price", normalize::PRICE),
        ("availability", normalize::AVAILABILITY),
        ("inventory_quantity", normalize::INTEGER),
        ("product_review_count", normalize::INTEGER),
        ("return_window", normalize::RETURN_WINDOW),
        ("is_eligible_search", normalize::BOOLEAN),
        ("is_eligible_checkout", normalize::BOOLEAN),
        ("target_countries", normalize::COUNTRY_LIST),
        ("store_country", normalize::CODE),
    ]);

    let defaults = DefaultTable::new()
        .with("condition", json!("new"))
        .with("is_eligible_search", json!(true))
        .with("is_eligible_checkout", json!(false));

    let rules = RuleSet::new()
        .field(FieldRule::required("item_id", FieldKind::text(100)))
        .field(FieldRule::required("title", FieldKind::text(150)))
        .field(FieldRule::required("description", FieldKind::text(5000)))
        .field(FieldRule::required("link", FieldKind::Url))
        .field(FieldRule::required("image_link", FieldKind::Url))
        .field(FieldRule::optional("brand", FieldKind::text(70)))
        .field(FieldRule::optional("gtin", FieldKind::Gtin))
        .field(FieldRule::optional("mpn", FieldKind::text(70)))
        .field(FieldRule::optional("condition", FieldKind::one_of(&["new", "refurbished", "used"])))
        .field(FieldRule::optional("product_category", FieldKind::text(750)))
        .field(FieldRule::required("price", FieldKind::Price))
        .field(FieldRule::optional("sale_price", FieldKind::Price))
        .field(FieldRule::required(
            "availability",
            FieldKind::one_of(&["in_stock", "out_of_stock", "preorder"]),
        ))
        .field(FieldRule::optional("availability_date", FieldKind::Date))
        .field(FieldRule::required(
            "inventory_quantity",
            FieldKind::Integer { min: 0, max: None },
        ))
        .field(FieldRule::required("seller_name", FieldKind::text(70)))
        .field(FieldRule::required("seller_url", FieldKind::Url))
        .field(FieldRule::optional("seller_privacy_policy", FieldKind::Url))
        .field(FieldRule::optional("seller_tos", FieldKind::Url))
        .field(FieldRule::required("return_policy", FieldKind::Url))
        .field(FieldRule::required(
            "return_window",
            FieldKind::Integer { min: 0, max: Some(365) },
        ))
        .field(FieldRule::required("is_eligible_search", FieldKind::Boolean))
        .field(FieldRule::required("is_eligible_checkout", FieldKind::Boolean))
        .field(FieldRule::optional(
            "product_review_count",
            FieldKind::Integer { min: 0, max: None },
        ))
        .field(FieldRule::optional("product_review_rating", FieldKind::Number { min: 0.0 }))
        .field(FieldRule::optional("target_countries", FieldKind::CountryList))
        .field(FieldRule::optional("store_country", FieldKind::CountryCode))
        .cross(CrossFieldRule::new(
            "seller_tos",
            &["is_eligible_checkout", "seller_tos"],
            checkout_requires_terms,
        ))
        .cross(CrossFieldRule::new(
            "seller_privacy_policy",
            &["is_eligible_checkout", "seller_privacy_policy"],
            checkout_requires_privacy_policy,
        ))
        .cross(CrossFieldRule::new(
            "is_eligible_search",
            &["is_eligible_checkout", "is_eligible_search"],
            checkout_requires_search,
        ))
        .cross(CrossFieldRule::new(
            "availability_date",
            &["availability", "availability_date"],
            preorder_requires_date,
        ))
        .cross(CrossFieldRule::new(
            "sale_price",
            &["price", "sale_price"],
            sale_price_not_above_price,
        ));

    ValidatorDefinition {
        id: "openai".to_string(),
        name: "OpenAI Product Feed".to_string(),
        version: "1.0".to_string(),
        formats: vec![FeedFormat::Csv, FeedFormat::Tsv, FeedFormat::Jsonl],
        aliases,
        normalizers,
        defaults,
        rules,
    }
}

/// Merchant listing feed for shopping ads and free listings.
pub fn google_merchant_center() -> ValidatorDefinition {
    let aliases = AliasTable::new()
        .with("id", &["item_id", "sku", "product_id", "offer_id"])
        .with("title", &["name", "product_name"])
        .with("description", &["desc", "product_description"])
        .with("link", &["url", "product_url"])
        .with("image_link", &["image", "image_url"])
        .with("brand", &["manufacturer", "vendor"])
        .with("gtin", &["ean", "upc", "barcode"])
        .with("condition", &["item_condition"])
        .with("price", &["regular_price", "list_price"])
        .with("sale_price", &["special_price", "discount_price"])
        .with("availability", &["stock_status", "availability_status"])
        .with("availability_date", &["available_date", "preorder_date"]);

    let normalizers = normalizers(&[
        ("id", normalize::TRIM),
        ("title", normalize::TRIM),
        ("link", normalize::TRIM),
        ("image_link", normalize::TRIM),
        ("gtin", normalize::GTIN),
        ("condition", normalize::CONDITION),
        ("price", normalize::PRICE),
        ("sale_price", normalize::PRICE),
        ("availability", normalize::AVAILABILITY),
    ]);

    let defaults = DefaultTable::new().with("condition", json!("new"));

    let rules = RuleSet::new()
        .field(FieldRule::required("id", FieldKind::text(50)))
        .field(FieldRule::required("title", FieldKind::text(150)))
        .field(FieldRule::required("description", FieldKind::text(5000)))
        .field(FieldRule::required("link", FieldKind::Url))
        .field(FieldRule::required("image_link", FieldKind::Url))
        .field(FieldRule::optional("brand", FieldKind::text(70)))
        .field(FieldRule::optional("gtin", FieldKind::Gtin))
        .field(FieldRule::optional("condition", FieldKind::one_of(&["new", "refurbished", "used"])))
        .field(FieldRule::required("price", FieldKind::Price))
        .field(FieldRule::optional("sale_price", FieldKind::Price))
        .field(FieldRule::required(
            "availability",
            FieldKind::one_of(&["in_stock", "out_of_stock", "preorder", "backorder"]),
        ))
        .field(FieldRule::optional("availability_date", FieldKind::Date))
        .cross(CrossFieldRule::new(
            "availability_date",
            &["availability", "availability_date"],
            preorder_requires_date,
        ))
        .cross(CrossFieldRule::new(
            "sale_price",
            &["price", "sale_price"],
            sale_price_not_above_price,
        ));

    ValidatorDefinition {
        id: "google".to_string(),
        name: "Google Merchant Center".to_string(),
        version: "2024.1".to_string(),
        formats: vec![FeedFormat::Csv, FeedFormat::Tsv],
        aliases,
        normalizers,
        defaults,
        rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn unknown_validator_lists_alternatives() {
        let registry = ValidatorRegistry::builtin();
        match registry.get("amazon") {
            Err(FeedError::UnknownValidator { id, available }) => {
                assert_eq!(id, "amazon");
                assert_eq!(available, vec!["openai".to_string(), "google".to_string()]);
            }
            other => panic!("expected unknown validator error, got {other:?}"),
        }
    }

    #[test]
    fn google_rejects_jsonl() {
        let registry = ValidatorRegistry::builtin();
        let google = registry.get("google").unwrap();
        assert!(google.ensure_supports(FeedFormat::Csv).is_ok());
        assert!(matches!(
            google.ensure_supports(FeedFormat::Jsonl),
            Err(FeedError::FormatNotSupported { .. })
        ));
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = ValidatorRegistry::builtin();
        let mut custom = google_merchant_center();
        custom.version = "custom".into();
        registry.register(custom);
        assert_eq!(registry.definitions().len(), 2);
        assert_eq!(registry.get("GOOGLE").unwrap().version, "custom");
    }

    #[test]
    fn sale_price_in_other_currency_is_rejected() {
        let definition = openai_product_feed();
        let typed = record(json!({"price": "10.00 USD", "sale_price": "8.00 EUR"}));
        assert!(sale_price_not_above_price(&typed).unwrap().contains("currency"));
        let reconciled = reconcile(
            &record(json!({"availability": "Pre-Order"})),
            &definition.aliases,
            &definition.normalizers,
            &definition.defaults,
        );
        assert!(preorder_requires_date(&reconciled).is_some());
    }
}
