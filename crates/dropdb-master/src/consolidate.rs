//! Cross-run deduplication into the master dataset.

use std::collections::{BTreeMap, HashMap};

use dropdb_core::urls::{canonical_url, normalize_whitespace};
use dropdb_core::{
    detect_locale, normalize_locale, supersedes, ConsolidatedRecord, ProviderMeta, ProviderRun,
    ScrapedProduct,
};

/// Locale bucket for records with no country signal at all.
pub const UNKNOWN_LOCALE: &str = "unknown";

/// Composite identity of a consolidated record. The href is canonical so
/// that tracking parameters do not split one product into two.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsolidationKey {
    pub provider_id: Option<i64>,
    pub product_id: Option<i64>,
    pub name: String,
    pub href: Option<String>,
}

impl ConsolidationKey {
    #[must_use]
    pub fn of(product: &ScrapedProduct) -> Self {
        Self {
            provider_id: product.provider_id,
            product_id: product.product_id,
            name: normalize_whitespace(&product.name),
            href: product.href.as_deref().map(canonical_url),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consolidation {
    pub records: Vec<ConsolidatedRecord>,
    pub by_locale: BTreeMap<String, usize>,
    /// Records read across all runs, before deduplication.
    pub inputs: usize,
    /// Records that collided with an already-kept key.
    pub duplicates: usize,
    /// Collisions where the later record replaced the kept one.
    pub superseded: usize,
}

/// Merges runs in the given order.
///
/// For records sharing a [`ConsolidationKey`] the survivor is the one with
/// the higher completeness score; on a tie the newer `scraped_at` wins, and
/// otherwise the first seen is kept. A superseding record takes the kept
/// record's position, so output order is first-seen order of keys.
#[must_use]
pub fn consolidate<I>(runs: I) -> Consolidation
where
    I: IntoIterator<Item = ProviderRun>,
{
    let mut out = Consolidation::default();
    let mut index: HashMap<ConsolidationKey, usize> = HashMap::new();

    for run in runs {
        for item in run.items {
            out.inputs += 1;
            let product = normalize(item, &run.meta);
            let key = ConsolidationKey::of(&product);
            match index.get(&key) {
                Some(&pos) => {
                    out.duplicates += 1;
                    let kept = &mut out.records[pos].product;
                    if supersedes(&product, kept) {
                        *kept = product;
                        out.superseded += 1;
                    }
                }
                None => {
                    index.insert(key, out.records.len());
                    out.records.push(ConsolidatedRecord { product });
                }
            }
        }
    }

    for record in &out.records {
        let bucket = record
            .product
            .locale
            .clone()
            .unwrap_or_else(|| UNKNOWN_LOCALE.to_string());
        *out.by_locale.entry(bucket).or_insert(0) += 1;
    }

    tracing::info!(
        inputs = out.inputs,
        total = out.records.len(),
        duplicates = out.duplicates,
        superseded = out.superseded,
        "consolidated provider runs"
    );
    out
}

/// Fills run-level fields the record lacks and resolves its locale.
fn normalize(mut product: ScrapedProduct, meta: &ProviderMeta) -> ScrapedProduct {
    product.name = normalize_whitespace(&product.name);
    if product.provider_name.trim().is_empty() {
        product.provider_name.clone_from(&meta.provider_name);
    }
    if product.provider_id.is_none() {
        product.provider_id = meta.provider_id;
    }
    if product.provider_url.trim().is_empty() {
        product.provider_url.clone_from(&meta.provider_url);
    }
    if product.scraped_at.is_none() {
        product.scraped_at = Some(meta.scraped_at);
    }
    product.locale = resolve_locale(&product, meta);
    product
}

fn resolve_locale(product: &ScrapedProduct, meta: &ProviderMeta) -> Option<String> {
    if let Some(locale) = product.locale.as_deref().and_then(normalize_locale) {
        return Some(locale);
    }
    if let Some(locale) = meta.locale.as_deref().and_then(normalize_locale) {
        return Some(locale);
    }
    let candidates = [
        product.image.as_deref(),
        product.href.as_deref(),
        Some(product.provider_url.as_str()),
        Some(meta.provider_url.as_str()),
    ];
    detect_locale(candidates.into_iter().flatten()).map(str::to_string)
}
