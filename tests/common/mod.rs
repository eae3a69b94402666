#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use feed_reconcile::data::Record;
use flate2::{Compression, write::GzEncoder};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

/// Header of a product feed carrying every field the `openai` validator requires.
pub const PRODUCT_HEADER: &str = "item_id,title,description,link,image_link,price,availability,inventory_quantity,seller_name,seller_url,return_policy,return_window";

/// One complete CSV row for [`PRODUCT_HEADER`], with `availability` still in
/// its free-text form.
pub fn product_row(id: &str) -> String {
    format!(
        "{id},Widget {id},A sturdy widget,https://shop.example.com/p/{id},https://shop.example.com/img/{id}.jpg,19.99 USD,In Stock,5,Example Shop,https://shop.example.com,https://shop.example.com/returns,30"
    )
}

pub fn product_csv(rows: usize) -> String {
    let mut csv = String::from(PRODUCT_HEADER);
    csv.push('\n');
    for idx in 1..=rows {
        csv.push_str(&product_row(&format!("SKU{idx}")));
        csv.push('\n');
    }
    csv
}

/// A raw record that passes the `openai` validator once normalized.
pub fn product_record(id: &str) -> Record {
    record(json!({
        "item_id": id,
        "title": format!("Widget {id}"),
        "description": "A sturdy widget",
        "link": format!("https://shop.example.com/p/{id}"),
        "image_link": format!("https://shop.example.com/img/{id}.jpg"),
        "price": "19.99 USD",
        "availability": "In Stock",
        "inventory_quantity": "5",
        "seller_name": "Example Shop",
        "seller_url": "https://shop.example.com",
        "return_policy": "https://shop.example.com/returns",
        "return_window": "30 days"
    }))
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("object literal")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes `contents` gzip-compressed.
    pub fn write_gz(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let file = File::create(&path).expect("create temp file");
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(contents.as_bytes())
            .expect("write gzip contents");
        encoder.finish().expect("finish gzip stream");
        path
    }
}
