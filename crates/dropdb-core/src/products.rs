use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category sentinel for cards with no category signal.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One item card as resolved during a single extraction pass.
///
/// `stock: None` means no stock signal was found, which is distinct from a
/// stock of zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawCard {
    pub name: String,
    pub category: String,
    pub price_provider_raw: Option<String>,
    pub price_suggested_raw: Option<String>,
    pub stock: Option<i64>,
    pub image_url: Option<String>,
    pub href: Option<String>,
    pub product_id: Option<i64>,
    pub provider_name_on_card: Option<String>,
}

/// Run-level metadata attached to every product of one provider run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMeta {
    #[serde(alias = "providerName")]
    pub provider_name: String,
    #[serde(default, alias = "providerId")]
    pub provider_id: Option<i64>,
    #[serde(alias = "providerUrl")]
    pub provider_url: String,
    #[serde(default, alias = "country")]
    pub locale: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A [`RawCard`] merged with its run metadata. Written once by the run store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    #[serde(alias = "providerName", alias = "provider")]
    pub provider_name: String,
    #[serde(default, alias = "providerId")]
    pub provider_id: Option<i64>,
    #[serde(default, alias = "providerUrl")]
    pub provider_url: String,
    #[serde(default, alias = "productId")]
    pub product_id: Option<i64>,
    pub name: String,
    #[serde(default = "default_category", alias = "category_name")]
    pub category: String,
    #[serde(default, alias = "priceProvider")]
    pub price_provider: Option<String>,
    #[serde(default, alias = "priceSuggested")]
    pub price_suggested: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default, alias = "image_url", alias = "imageUrl")]
    pub image: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default, alias = "country")]
    pub locale: Option<String>,
    #[serde(
        default,
        alias = "providerNameOnCard",
        skip_serializing_if = "Option::is_none"
    )]
    pub card_provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

impl ScrapedProduct {
    #[must_use]
    pub fn from_card(card: RawCard, meta: &ProviderMeta) -> Self {
        Self {
            provider_name: meta.provider_name.clone(),
            provider_id: meta.provider_id,
            provider_url: meta.provider_url.clone(),
            product_id: card.product_id,
            name: card.name,
            category: card.category,
            price_provider: card.price_provider_raw,
            price_suggested: card.price_suggested_raw,
            stock: card.stock,
            image: card.image_url,
            href: card.href,
            locale: meta.locale.clone(),
            card_provider_name: card.provider_name_on_card,
            scraped_at: Some(meta.scraped_at),
        }
    }
}

/// Number of identity/stock fields present: stock, href and product id.
#[must_use]
pub fn completeness(product: &ScrapedProduct) -> u8 {
    u8::from(product.stock.is_some())
        + u8::from(product.href.is_some())
        + u8::from(product.product_id.is_some())
}

/// Whether `candidate` should replace `kept` for the same identity: higher
/// [`completeness`] wins, then the newer `scraped_at`. Otherwise the record
/// already kept stays.
#[must_use]
pub fn supersedes(candidate: &ScrapedProduct, kept: &ScrapedProduct) -> bool {
    match completeness(candidate).cmp(&completeness(kept)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match (candidate.scraped_at, kept.scraped_at) {
            (Some(new), Some(old)) => new > old,
            _ => false,
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCounts {
    #[serde(alias = "withStock")]
    pub with_stock: usize,
    #[serde(alias = "withHref")]
    pub with_href: usize,
    #[serde(alias = "withId")]
    pub with_id: usize,
}

impl FieldCounts {
    #[must_use]
    pub fn tally(items: &[ScrapedProduct]) -> Self {
        items.iter().fold(Self::default(), |mut acc, item| {
            acc.with_stock += usize::from(item.stock.is_some());
            acc.with_href += usize::from(item.href.is_some());
            acc.with_id += usize::from(item.product_id.is_some());
            acc
        })
    }
}

/// One scrape execution for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRun {
    pub meta: ProviderMeta,
    pub items: Vec<ScrapedProduct>,
    pub counts: FieldCounts,
}

impl ProviderRun {
    /// Builds a run, computing its summary counts from `items`.
    #[must_use]
    pub fn new(meta: ProviderMeta, items: Vec<ScrapedProduct>) -> Self {
        let counts = FieldCounts::tally(&items);
        Self {
            meta,
            items,
            counts,
        }
    }
}

/// A product as emitted by the master consolidator: locale re-derived when
/// the run carried none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidatedRecord {
    pub product: ScrapedProduct,
}

impl ConsolidatedRecord {
    #[must_use]
    pub fn completeness(&self) -> u8 {
        completeness(&self.product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ProviderMeta {
        ProviderMeta {
            provider_name: "Acme".to_string(),
            provider_id: Some(9),
            provider_url: "https://app.example.cl/dashboard/provider/9/acme".to_string(),
            locale: Some("chile".to_string()),
            scraped_at: DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn card(name: &str) -> RawCard {
        RawCard {
            name: name.to_string(),
            category: UNCATEGORIZED.to_string(),
            ..RawCard::default()
        }
    }

    #[test]
    fn from_card_merges_run_metadata() {
        let mut raw = card("Widget");
        raw.stock = Some(0);
        raw.provider_name_on_card = Some("Acme Store".to_string());
        let product = ScrapedProduct::from_card(raw, &meta());
        assert_eq!(product.provider_id, Some(9));
        assert_eq!(product.locale.as_deref(), Some("chile"));
        assert_eq!(product.stock, Some(0));
        assert_eq!(product.card_provider_name.as_deref(), Some("Acme Store"));
        assert!(product.scraped_at.is_some());
    }

    #[test]
    fn completeness_counts_stock_href_and_id() {
        let mut product = ScrapedProduct::from_card(card("Widget"), &meta());
        assert_eq!(completeness(&product), 0);
        product.stock = Some(0);
        product.product_id = Some(451);
        assert_eq!(completeness(&product), 2);
        product.href = Some("https://x.cl/p/451".to_string());
        assert_eq!(completeness(&product), 3);
    }

    #[test]
    fn provider_run_new_tallies_counts() {
        let mut a = ScrapedProduct::from_card(card("A"), &meta());
        a.stock = Some(3);
        a.product_id = Some(1);
        let b = ScrapedProduct::from_card(card("B"), &meta());
        let run = ProviderRun::new(meta(), vec![a, b]);
        assert_eq!(
            run.counts,
            FieldCounts {
                with_stock: 1,
                with_href: 0,
                with_id: 1
            }
        );
    }

    #[test]
    fn scraped_product_accepts_camel_case_fields() {
        let json = r#"{
            "providerName": "Acme",
            "providerId": 9,
            "providerUrl": "https://app.example.cl/dashboard/provider/9",
            "productId": 451,
            "name": "Widget",
            "priceProvider": "$ 1.990",
            "stock": 12,
            "image_url": "https://cdn.example.cl/products/451/a.jpg",
            "country": "CL"
        }"#;
        let product: ScrapedProduct = serde_json::from_str(json).unwrap();
        assert_eq!(product.product_id, Some(451));
        assert_eq!(product.category, UNCATEGORIZED);
        assert_eq!(product.locale.as_deref(), Some("CL"));
        assert_eq!(
            product.image.as_deref(),
            Some("https://cdn.example.cl/products/451/a.jpg")
        );
    }

    #[test]
    fn supersedes_prefers_completeness_then_recency() {
        let mut sparse = ScrapedProduct::from_card(card("Widget"), &meta());
        let mut full = sparse.clone();
        full.stock = Some(12);
        assert!(supersedes(&full, &sparse));
        assert!(!supersedes(&sparse, &full));

        sparse.stock = Some(4);
        let mut newer = sparse.clone();
        newer.scraped_at = newer.scraped_at.map(|t| t + chrono::Duration::hours(1));
        assert!(supersedes(&newer, &sparse));
        assert!(!supersedes(&sparse, &newer));

        full.scraped_at = None;
        assert!(!supersedes(&full, &sparse));
    }
}
