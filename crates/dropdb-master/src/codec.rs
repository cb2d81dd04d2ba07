//! Flat CSV encoding shared by provider runs and the master dataset.
//!
//! Column order is fixed: provider name, provider id, provider URL,
//! product id, name, category, provider price, suggested price, stock,
//! image, href, locale. Empty cells decode to `None`.

use std::io;

use serde::{Deserialize, Serialize};

use dropdb_core::{ScrapedProduct, UNCATEGORIZED};

pub const COLUMNS: [&str; 12] = [
    "provider_name",
    "provider_id",
    "provider_url",
    "product_id",
    "name",
    "category",
    "price_provider",
    "price_suggested",
    "stock",
    "image",
    "href",
    "locale",
];

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    provider_name: String,
    provider_id: Option<i64>,
    provider_url: String,
    product_id: Option<i64>,
    name: String,
    category: String,
    price_provider: Option<String>,
    price_suggested: Option<String>,
    stock: Option<i64>,
    image: Option<String>,
    href: Option<String>,
    locale: Option<String>,
}

impl From<&ScrapedProduct> for CsvRow {
    fn from(p: &ScrapedProduct) -> Self {
        Self {
            provider_name: p.provider_name.clone(),
            provider_id: p.provider_id,
            provider_url: p.provider_url.clone(),
            product_id: p.product_id,
            name: p.name.clone(),
            category: p.category.clone(),
            price_provider: p.price_provider.clone(),
            price_suggested: p.price_suggested.clone(),
            stock: p.stock,
            image: p.image.clone(),
            href: p.href.clone(),
            locale: p.locale.clone(),
        }
    }
}

impl From<CsvRow> for ScrapedProduct {
    fn from(row: CsvRow) -> Self {
        let category = if row.category.trim().is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            row.category
        };
        Self {
            provider_name: row.provider_name,
            provider_id: row.provider_id,
            provider_url: row.provider_url,
            product_id: row.product_id,
            name: row.name,
            category,
            price_provider: non_empty(row.price_provider),
            price_suggested: non_empty(row.price_suggested),
            stock: row.stock,
            image: non_empty(row.image),
            href: non_empty(row.href),
            locale: non_empty(row.locale),
            card_provider_name: None,
            scraped_at: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Writes the header row, then one row per product.
///
/// # Errors
///
/// Returns the underlying [`csv::Error`] on write failure.
pub fn write_products<'a, W, I>(writer: W, products: I) -> Result<(), csv::Error>
where
    W: io::Write,
    I: IntoIterator<Item = &'a ScrapedProduct>,
{
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for product in products {
        wtr.serialize(CsvRow::from(product))?;
    }
    wtr.flush()?;
    Ok(())
}

/// # Errors
///
/// Returns [`csv::Error`] for malformed rows or non-numeric id/stock cells.
pub fn read_products<R: io::Read>(reader: R) -> Result<Vec<ScrapedProduct>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    rdr.deserialize::<CsvRow>()
        .map(|row| row.map(ScrapedProduct::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ScrapedProduct {
        ScrapedProduct {
            provider_name: "Acme, Sur".to_string(),
            provider_id: Some(9),
            provider_url: "https://app.example.cl/dashboard/provider/9/acme".to_string(),
            product_id: Some(451),
            name: "Widget \"Pro\"".to_string(),
            category: "Hogar".to_string(),
            price_provider: Some("$ 12.990".to_string()),
            price_suggested: None,
            stock: Some(0),
            image: None,
            href: Some("https://app.example.cl/dashboard/product-details/451".to_string()),
            locale: Some("chile".to_string()),
            card_provider_name: Some("Acme".to_string()),
            scraped_at: None,
        }
    }

    #[test]
    fn header_has_fixed_column_order() {
        let mut buf = Vec::new();
        write_products(&mut buf, &[product()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "provider_name,provider_id,provider_url,product_id,name,category,\
             price_provider,price_suggested,stock,image,href,locale"
        );
    }

    #[test]
    fn commas_and_quotes_are_escaped() {
        let mut buf = Vec::new();
        write_products(&mut buf, &[product()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("\"Acme, Sur\",9,"));
        assert!(row.contains("\"Widget \"\"Pro\"\"\""));
    }

    #[test]
    fn empty_cells_read_back_as_none_and_zero_stock_survives() {
        let mut buf = Vec::new();
        write_products(&mut buf, &[product()]).unwrap();
        let back = read_products(buf.as_slice()).unwrap();
        assert_eq!(back.len(), 1);
        let p = &back[0];
        assert_eq!(p.name, "Widget \"Pro\"");
        assert_eq!(p.stock, Some(0));
        assert_eq!(p.price_suggested, None);
        assert_eq!(p.image, None);
        assert_eq!(p.card_provider_name, None);
    }

    #[test]
    fn blank_category_reads_as_uncategorized() {
        let csv = "provider_name,provider_id,provider_url,product_id,name,category,\
                   price_provider,price_suggested,stock,image,href,locale\n\
                   Acme,,https://x.cl,,Widget,,,,,,,\n";
        let back = read_products(csv.as_bytes()).unwrap();
        assert_eq!(back[0].category, UNCATEGORIZED);
        assert_eq!(back[0].provider_id, None);
        assert_eq!(back[0].locale, None);
    }
}
