//! CSS selectors for card markup.
//!
//! When a storefront changes its templates, capture a card's markup, add it
//! as a fixture and update the selectors here.

use std::sync::LazyLock;

use scraper::Selector;

fn parse(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

pub static NAME: LazyLock<Selector> =
    LazyLock::new(|| parse(r#"h3, .title, .tittle-product, [class*="title"]"#));

pub static CATEGORY: LazyLock<Selector> = LazyLock::new(|| {
    parse(
        r#".category-stock > div:first-child, [class*="category-name"], .category, .chips-container .chip"#,
    )
});

pub static CHIP: LazyLock<Selector> = LazyLock::new(|| parse(".chips-container .chip"));

pub static IMAGE: LazyLock<Selector> = LazyLock::new(|| parse("img, source"));

pub static PRODUCT_ANCHOR: LazyLock<Selector> = LazyLock::new(|| {
    parse(r#"a[href*="/product-details/"], a[href*="/dashboard/product"], a[href*="/product"]"#)
});

pub static ANY_ANCHOR: LazyLock<Selector> = LazyLock::new(|| parse("a[href]"));

pub static ROUTER_LINK: LazyLock<Selector> =
    LazyLock::new(|| parse("[routerlink], [ng-reflect-router-link]"));

pub static STOCK: LazyLock<Selector> =
    LazyLock::new(|| parse(r#".stock, .stock-count, [class*="stock"]"#));

pub static CARD_PROVIDER: LazyLock<Selector> =
    LazyLock::new(|| parse(".provider-data .provider-name, .provider-name"));
