use std::collections::HashSet;

use url::Url;

use dropdb_core::{FieldCounts, ProviderMeta, RawCard, ScrapedProduct};

use crate::card::{CardHandle, CardSnapshot};
use crate::resolve::category::resolve_category;
use crate::resolve::identity::resolve_identity;
use crate::resolve::image::resolve_image;
use crate::resolve::name::{resolve_card_provider, resolve_name};
use crate::resolve::price::resolve_prices;
use crate::resolve::stock::resolve_stock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub cards_seen: usize,
    pub skipped_unnamed: usize,
    pub skipped_duplicate: usize,
    pub emitted: usize,
    pub counts: FieldCounts,
}

/// Turns card snapshots into products for one provider run.
///
/// The dedup set lives on the extractor, so one extractor must be used per
/// run and never shared between runs.
#[derive(Debug, Default)]
pub struct Extractor {
    seen: HashSet<(String, String)>,
    stats: ExtractionStats,
}

impl Extractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    /// Resolves one card. Returns `None` for unnamed cards and for cards
    /// whose (name, image) pair was already emitted in this run.
    pub fn extract_card(&mut self, card: &CardHandle) -> Option<RawCard> {
        self.stats.cards_seen += 1;

        let Some(name) = resolve_name(card) else {
            self.stats.skipped_unnamed += 1;
            return None;
        };
        let image_url = resolve_image(card);
        let key = (name.clone(), image_url.clone().unwrap_or_default());
        if !self.seen.insert(key) {
            self.stats.skipped_duplicate += 1;
            return None;
        }

        let identity = resolve_identity(card);
        let prices = resolve_prices(card);
        let stock = resolve_stock(card);

        self.stats.emitted += 1;
        self.stats.counts.with_stock += usize::from(stock.is_some());
        self.stats.counts.with_href += usize::from(identity.is_some());
        self.stats.counts.with_id += usize::from(identity.is_some());

        Some(RawCard {
            category: resolve_category(card),
            price_provider_raw: prices.provider,
            price_suggested_raw: prices.suggested,
            stock,
            image_url,
            href: identity.as_ref().map(|i| i.href.clone()),
            product_id: identity.map(|i| i.product_id),
            provider_name_on_card: resolve_card_provider(card),
            name,
        })
    }

    /// Extracts every snapshot, merging run metadata into each product.
    pub fn extract(
        &mut self,
        snapshots: Vec<CardSnapshot>,
        origin: &Url,
        meta: &ProviderMeta,
    ) -> Vec<ScrapedProduct> {
        snapshots
            .into_iter()
            .filter_map(|snapshot| {
                let card = CardHandle::new(snapshot, origin.clone());
                self.extract_card(&card)
            })
            .map(|raw| ScrapedProduct::from_card(raw, meta))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::card::CanvasText;

    fn origin() -> Url {
        Url::parse("https://app.example.cl/dashboard/provider/9/acme").unwrap()
    }

    fn meta() -> ProviderMeta {
        ProviderMeta {
            provider_name: "Acme".to_string(),
            provider_id: Some(9),
            provider_url: origin().to_string(),
            locale: Some("chile".to_string()),
            scraped_at: Utc::now(),
        }
    }

    fn snap(html: &str) -> CardSnapshot {
        CardSnapshot {
            html: html.to_string(),
            ..CardSnapshot::default()
        }
    }

    #[test]
    fn unnamed_cards_are_excluded_even_when_rich() {
        let mut extractor = Extractor::new();
        let products = extractor.extract(
            vec![snap(
                r#"<div data-product-id="5" data-stock="3"><img src="/products/5/a.jpg"><p>$ 1.000</p></div>"#,
            )],
            &origin(),
            &meta(),
        );
        assert!(products.is_empty());
        assert_eq!(extractor.stats().skipped_unnamed, 1);
    }

    #[test]
    fn duplicate_name_and_image_within_run_are_dropped() {
        let card = r#"<div><h3>Widget</h3><img src="https://cdn.example.cl/products/1/a.jpg"></div>"#;
        let other_image = r#"<div><h3>Widget</h3><img src="https://cdn.example.cl/products/2/a.jpg"></div>"#;
        let mut extractor = Extractor::new();
        let products = extractor.extract(
            vec![snap(card), snap(card), snap(other_image), snap(card)],
            &origin(),
            &meta(),
        );
        assert_eq!(products.len(), 2);
        let stats = extractor.stats();
        assert_eq!(stats.cards_seen, 4);
        assert_eq!(stats.skipped_duplicate, 2);
        assert_eq!(stats.emitted, 2);
    }

    #[test]
    fn full_card_resolves_every_field() {
        let snapshot = CardSnapshot {
            html: r#"<div class="product-card">
                <img src="https://cdn.example.cl/verified.png">
                <img src="https://cdn.example.cl/products/451/photo.jpg">
                <h3>Widget  Pro</h3>
                <div class="category-stock"><div>Hogar</div><div class="stock-container"><canvas></canvas></div></div>
                <a href="/dashboard/product-details/451?x=1">Ver</a>
                <div class="provider-name">Acme Sur</div>
            </div>"#
                .to_string(),
            text: "Widget Pro Hogar Precio $ 12.990 Sugerido $ 19.990 Acme Sur".to_string(),
            canvases: vec![CanvasText {
                texts: vec!["12".to_string()],
                stock_scoped: true,
            }],
        };
        let mut extractor = Extractor::new();
        let products = extractor.extract(vec![snapshot], &origin(), &meta());
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.name, "Widget Pro");
        assert_eq!(p.category, "Hogar");
        assert_eq!(p.product_id, Some(451));
        assert_eq!(
            p.href.as_deref(),
            Some("https://app.example.cl/dashboard/product-details/451?x=1")
        );
        assert_eq!(p.stock, Some(12));
        assert_eq!(
            p.image.as_deref(),
            Some("https://cdn.example.cl/products/451/photo.jpg")
        );
        assert_eq!(p.price_provider.as_deref(), Some("$ 12.990"));
        assert_eq!(p.price_suggested.as_deref(), Some("$ 19.990"));
        assert_eq!(p.card_provider_name.as_deref(), Some("Acme Sur"));
        assert_eq!(p.provider_id, Some(9));
        assert_eq!(p.locale.as_deref(), Some("chile"));

        let counts = extractor.stats().counts;
        assert_eq!(counts.with_stock, 1);
        assert_eq!(counts.with_href, 1);
        assert_eq!(counts.with_id, 1);
    }
}
