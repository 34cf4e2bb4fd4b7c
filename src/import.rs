//! Bulk product import from CSV.
//!
//! Rows are validated one by one; a bad row is reported and skipped, never
//! fatal to the batch. Valid rows become legacy-shape products and are
//! written in fixed-size batches.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{LegacyDetails, Product, ProductDetails};
use crate::domain::value_objects::slugify;
use crate::store::CommerceStore;

pub const DEFAULT_BATCH_SIZE: usize = 500;
const MAX_NAME_LEN: usize = 200;
const REQUIRED_COLUMNS: [&str; 3] = ["name", "price", "category"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("CSV could not be read: {0}")]
    Csv(#[from] csv::Error),
}

/// One outcome per data row, keyed by the row's line number in the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Imported { row: u64, product_id: Uuid, name: String },
    Valid { row: u64, name: String },
    Failed { row: u64, errors: Vec<String> },
}

impl RowOutcome {
    pub fn row(&self) -> u64 {
        match self {
            Self::Imported { row, .. } | Self::Valid { row, .. } | Self::Failed { row, .. } => *row,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub outcomes: Vec<RowOutcome>,
}

impl ImportReport {
    fn from_outcomes(mut outcomes: Vec<RowOutcome>, dry_run: bool) -> Self {
        outcomes.sort_by_key(RowOutcome::row);
        let failed = outcomes.iter().filter(|o| matches!(o, RowOutcome::Failed { .. })).count();
        Self { total_rows: outcomes.len(), succeeded: outcomes.len() - failed, failed, dry_run, outcomes }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(|o| matches!(o, RowOutcome::Failed { .. }))
    }
}

/// Uploaded images addressable by file name or by file stem.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    by_name: HashMap<String, String>,
    by_stem: HashMap<String, String>,
}

impl ImageIndex {
    pub fn insert(&mut self, filename: &str, url: impl Into<String>) {
        let url = url.into();
        let name = filename.trim().to_lowercase();
        let stem = name.rsplit_once('.').map_or(name.as_str(), |(stem, _)| stem);
        self.by_stem.insert(slugify(stem), url.clone());
        self.by_name.insert(name, url);
    }

    pub fn by_filename(&self, filename: &str) -> Option<&str> {
        self.by_name.get(&filename.trim().to_lowercase()).map(String::as_str)
    }

    /// Image whose file stem equals the slug of a product name, e.g.
    /// `blue-denim-jacket.jpg` for "Blue Denim Jacket".
    pub fn for_product_name(&self, name: &str) -> Option<&str> {
        self.by_stem.get(&slugify(name)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool { self.by_name.is_empty() }
}

impl<S: AsRef<str>, U: Into<String>> FromIterator<(S, U)> for ImageIndex {
    fn from_iter<I: IntoIterator<Item = (S, U)>>(iter: I) -> Self {
        let mut index = Self::default();
        for (name, url) in iter { index.insert(name.as_ref(), url); }
        index
    }
}

/// Result of parsing: products ready to write plus the rows that failed.
#[derive(Debug, Default)]
pub struct ParsedImport {
    pub products: Vec<(u64, Product)>,
    pub failures: Vec<RowOutcome>,
}

impl ParsedImport {
    pub fn preview(&self) -> ImportReport {
        let valid = self.products.iter().map(|(row, p)| RowOutcome::Valid { row: *row, name: p.name.clone() });
        ImportReport::from_outcomes(valid.chain(self.failures.iter().cloned()).collect(), true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    name: usize,
    price: usize,
    category: usize,
    description: Option<usize>,
    in_stock: Option<usize>,
    rating: Option<usize>,
    reviews: Option<usize>,
    image_url: Option<usize>,
    subcategory: Option<usize>,
    original_price: Option<usize>,
    sizes: Option<usize>,
    colors: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let index: HashMap<String, usize> = headers.iter().enumerate()
            .map(|(i, h)| (h.trim().to_lowercase().replace(['_', ' ', '-'], ""), i))
            .collect();
        let find = |key: &str| index.get(key).copied();
        let require = |key: &'static str| find(key).ok_or(ImportError::MissingColumn(key));
        for key in REQUIRED_COLUMNS { require(key)?; }
        Ok(Self {
            name: require("name")?,
            price: require("price")?,
            category: require("category")?,
            description: find("description"),
            in_stock: find("instock"),
            rating: find("rating"),
            reviews: find("reviews"),
            image_url: find("imageurl"),
            subcategory: find("subcategory"),
            original_price: find("originalprice"),
            sizes: find("sizes"),
            colors: find("colors"),
        })
    }
}

fn csv_reader(input: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

/// Reads only the header row and checks the required columns are present.
pub fn check_headers(input: &[u8]) -> Result<(), ImportError> {
    Columns::from_headers(csv_reader(input).headers()?).map(|_| ())
}

/// Parses and validates CSV text into products, one outcome per row.
pub fn parse_products(input: &[u8], images: &ImageIndex) -> Result<ParsedImport, ImportError> {
    let mut reader = csv_reader(input);
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut parsed = ParsedImport::default();
    for (i, result) in reader.records().enumerate() {
        let fallback_row = i as u64 + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let row = e.position().map_or(fallback_row, csv::Position::line);
                parsed.failures.push(RowOutcome::Failed { row, errors: vec![e.to_string()] });
                continue;
            }
        };
        if record.iter().all(str::is_empty) { continue; }
        let row = record.position().map_or(fallback_row, csv::Position::line);
        match product_from_record(&record, &columns, images) {
            Ok(product) => parsed.products.push((row, product)),
            Err(errors) => {
                tracing::debug!(row, errors = ?errors, "import row rejected");
                parsed.failures.push(RowOutcome::Failed { row, errors });
            }
        }
    }
    Ok(parsed)
}

fn product_from_record(record: &csv::StringRecord, cols: &Columns, images: &ImageIndex) -> Result<Product, Vec<String>> {
    let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty());
    let mut errors = Vec::new();

    let name = field(Some(cols.name)).unwrap_or_default();
    if name.is_empty() {
        errors.push("name is required".to_string());
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push(format!("name must be at most {MAX_NAME_LEN} characters"));
    }

    let price = match field(Some(cols.price)) {
        None => { errors.push("price is required".to_string()); None }
        Some(raw) => match parse_decimal(raw) {
            Some(p) if p > Decimal::ZERO => Some(p),
            Some(_) => { errors.push("price must be greater than zero".to_string()); None }
            None => { errors.push(format!("price '{raw}' is not a number")); None }
        },
    };

    let category = field(Some(cols.category)).unwrap_or_default();
    if category.is_empty() { errors.push("category is required".to_string()); }

    let in_stock = match field(cols.in_stock) {
        None => true,
        Some(raw) => parse_bool(raw).unwrap_or_else(|| {
            errors.push(format!("inStock '{raw}' must be true/false, yes/no or 1/0"));
            true
        }),
    };

    let rating = match field(cols.rating) {
        None => Decimal::ZERO,
        Some(raw) => match parse_decimal(raw) {
            Some(r) if r >= Decimal::ZERO && r <= Decimal::from(5) => r,
            _ => { errors.push(format!("rating '{raw}' must be a number from 0 to 5")); Decimal::ZERO }
        },
    };

    let review_count = match field(cols.reviews) {
        None => 0,
        Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
            errors.push(format!("reviews '{raw}' must be a whole number"));
            0
        }),
    };

    let original_price = match field(cols.original_price) {
        None => None,
        Some(raw) => match parse_decimal(raw) {
            Some(p) if p > Decimal::ZERO => Some(p),
            _ => { errors.push(format!("originalPrice '{raw}' must be a positive number")); None }
        },
    };

    let image = match field(cols.image_url) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url.to_string()),
        Some(filename) => match images.by_filename(filename) {
            Some(url) => Some(url.to_string()),
            None => { errors.push(format!("image '{filename}' was not uploaded")); None }
        },
        None => images.for_product_name(name).map(str::to_string),
    };

    let Some(price) = price else { return Err(errors) };
    if !errors.is_empty() { return Err(errors); }

    let mut product = Product::create(name, category, ProductDetails::Legacy(LegacyDetails {
        price,
        original_price,
        in_stock,
        stock_quantity: None,
        sizes: split_list(field(cols.sizes)),
        colors: split_list(field(cols.colors)),
    }));
    product.description = field(cols.description).unwrap_or_default().to_string();
    product.subcategory = field(cols.subcategory).map(str::to_string);
    product.rating = rating;
    product.review_count = review_count;
    product.images = image.into_iter().collect();
    Ok(product)
}

/// Writes parsed products in batches of `batch_size`. A failed batch marks
/// every row in it failed; later batches still run.
pub async fn write_batches(store: &dyn CommerceStore, parsed: ParsedImport, batch_size: usize) -> ImportReport {
    let ParsedImport { products, mut failures } = parsed;
    let mut outcomes = Vec::with_capacity(products.len() + failures.len());
    for chunk in products.chunks(batch_size.max(1)) {
        let batch: Vec<Product> = chunk.iter().map(|(_, p)| p.clone()).collect();
        match store.insert_products(&batch).await {
            Ok(()) => outcomes.extend(chunk.iter().map(|(row, p)| RowOutcome::Imported { row: *row, product_id: p.id, name: p.name.clone() })),
            Err(e) => {
                tracing::error!(error = %e, rows = chunk.len(), "import batch write failed");
                failures.extend(chunk.iter().map(|(row, _)| RowOutcome::Failed { row: *row, errors: vec![format!("batch write failed: {e}")] }));
            }
        }
    }
    outcomes.append(&mut failures);
    let report = ImportReport::from_outcomes(outcomes, false);
    tracing::info!(total = report.total_rows, imported = report.succeeded, failed = report.failed, "bulk import finished");
    report
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().trim_start_matches('$').chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&cleaned).ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|v| v.split('|').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::AttributeSelection;
    use crate::store::MemoryStore;

    const HEADER: &str = "name,description,price,category,inStock,rating,reviews,imageUrl";

    fn csv(rows: &[&str]) -> Vec<u8> {
        let mut text = String::from(HEADER);
        for row in rows { text.push('\n'); text.push_str(row); }
        text.into_bytes()
    }

    #[test]
    fn header_check_reads_only_the_header_row() {
        assert!(check_headers(&csv(&["Lamp,,not-a-price,Lighting,,,,"])).is_ok());
        let err = check_headers(b"name,category\nLamp,Lighting").unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("price")));
    }

    #[test]
    fn invalid_rows_are_reported_and_valid_rows_kept() {
        let input = csv(&[
            "Desk Lamp,Warm light,39.90,Lighting,true,4.5,12,https://cdn.example.com/lamp.jpg",
            ",Missing name,10,Lighting,true,,,",
            "Floor Lamp,Tall,abc,Lighting,maybe,7,,",
            "Pendant,Hanging,25,Lighting,no,,3,",
        ]);
        let parsed = parse_products(&input, &ImageIndex::default()).unwrap();
        assert_eq!(parsed.products.len(), 2);
        assert_eq!(parsed.failures.len(), 2);

        let report = parsed.preview();
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.failed, 2);
        let failures: Vec<_> = report.failures().cloned().collect();
        assert_eq!(failures[0], RowOutcome::Failed { row: 3, errors: vec!["name is required".into()] });
        match &failures[1] {
            RowOutcome::Failed { row, errors } => {
                assert_eq!(*row, 4);
                assert_eq!(errors.len(), 3, "price, inStock and rating errors: {errors:?}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn row_fields_map_onto_legacy_product() {
        let input = csv(&["Desk Lamp,Warm light,$1,299.00,Lighting,no,4.5,12,"]);
        let parsed = parse_products(&input, &ImageIndex::default()).unwrap();
        // The unquoted thousands separator shifts columns, so the row fails.
        assert_eq!(parsed.failures.len(), 1);

        let input = csv(&["Desk Lamp,Warm light,\"$1,299.00\",Lighting,no,4.5,12,"]);
        let parsed = parse_products(&input, &ImageIndex::default()).unwrap();
        let (_, lamp) = &parsed.products[0];
        assert_eq!(lamp.base_price(), Decimal::new(129_900, 2));
        assert!(!lamp.is_in_stock(&AttributeSelection::new()));
        assert_eq!(lamp.review_count, 12);
        assert_eq!(lamp.description, "Warm light");
    }

    #[test]
    fn images_match_by_filename_or_name_slug() {
        let images: ImageIndex = [
            ("Lamp-01.JPG", "https://cdn.example.com/a.jpg"),
            ("floor-lamp.png", "https://cdn.example.com/b.png"),
        ].into_iter().collect();
        let input = csv(&[
            "Desk Lamp,,20,Lighting,,,,lamp-01.jpg",
            "Floor Lamp,,30,Lighting,,,,",
            "Wall Lamp,,30,Lighting,,,,wall.jpg",
        ]);
        let parsed = parse_products(&input, &images).unwrap();
        assert_eq!(parsed.products[0].1.images, vec!["https://cdn.example.com/a.jpg"]);
        assert_eq!(parsed.products[1].1.images, vec!["https://cdn.example.com/b.png"]);
        assert_eq!(parsed.failures, vec![RowOutcome::Failed { row: 4, errors: vec!["image 'wall.jpg' was not uploaded".into()] }]);
    }

    #[test]
    fn optional_columns_and_header_variants() {
        let input = b"Name,Price,Category,Sub_Category,original_price,sizes,colors\nTee,10,Apparel,Shirts,15,S|M|L,red| blue\n";
        let parsed = parse_products(input, &ImageIndex::default()).unwrap();
        let (_, tee) = &parsed.products[0];
        assert_eq!(tee.subcategory.as_deref(), Some("Shirts"));
        assert_eq!(tee.to_enhanced().variants().len(), 6);
        assert_eq!(tee.discount_percent(&AttributeSelection::new()), Some(33));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let err = parse_products(b"name,category\nLamp,Lighting\n", &ImageIndex::default()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("price")));
    }

    #[tokio::test]
    async fn batches_write_every_valid_row() {
        let store = MemoryStore::default();
        let rows: Vec<String> = (1..=5).map(|i| format!("Item {i},,{i},Misc,,,,")).collect();
        let input = csv(&rows.iter().map(String::as_str).chain(["Broken,,-1,Misc,,,,"]).collect::<Vec<_>>());
        let parsed = parse_products(&input, &ImageIndex::default()).unwrap();
        let report = write_batches(&store, parsed, 2).await;
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 1);
        assert!(!report.dry_run);
        assert_eq!(store.list_products(None).await.unwrap().len(), 5);
    }
}
