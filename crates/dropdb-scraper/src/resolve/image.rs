use std::sync::LazyLock;

use regex::Regex;

use crate::card::CardHandle;
use crate::resolve::{first_match, selectors, Strategy};

/// Assets that appear on cards but are not product photos.
static NON_PRODUCT_ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)verified|categories_providers|logo|no-image|badges/premium")
        .expect("valid regex")
});

const STRATEGIES: &[Strategy<String>] = &[product_image, any_image];

/// The first image source on the card that is not a badge, icon or
/// placeholder; failing that, the first image source at all.
#[must_use]
pub fn resolve_image(card: &CardHandle) -> Option<String> {
    first_match(card, STRATEGIES)
}

fn product_image(card: &CardHandle) -> Option<String> {
    image_sources(card)
        .into_iter()
        .find(|src| !NON_PRODUCT_ASSET_RE.is_match(src))
}

fn any_image(card: &CardHandle) -> Option<String> {
    image_sources(card).into_iter().next()
}

fn image_sources(card: &CardHandle) -> Vec<String> {
    card.select(&selectors::IMAGE)
        .filter_map(|el| {
            let attrs = el.value();
            attrs
                .attr("src")
                .or_else(|| attrs.attr("data-src"))
                .or_else(|| attrs.attr("srcset").and_then(first_srcset_url))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| card.absolutize(s))
        })
        .collect()
}

fn first_srcset_url(srcset: &str) -> Option<&str> {
    srcset.split(',').next()?.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::fixtures::card;

    #[test]
    fn skips_badges_and_logos() {
        let c = card(
            r#"<div>
                <img src="https://cdn.example.cl/badges/premium/gold.svg">
                <img src="/assets/verified.png">
                <img src="https://cdn.example.cl/products/451/photo.jpg">
            </div>"#,
        );
        assert_eq!(
            resolve_image(&c).as_deref(),
            Some("https://cdn.example.cl/products/451/photo.jpg")
        );
    }

    #[test]
    fn falls_back_to_first_image_when_all_denied() {
        let c = card(r#"<div><img src="/img/no-image.png"><img src="/img/logo.png"></div>"#);
        assert_eq!(
            resolve_image(&c).as_deref(),
            Some("https://app.example.cl/img/no-image.png")
        );
    }

    #[test]
    fn reads_lazy_and_srcset_sources() {
        let c = card(
            r#"<div><picture><source srcset="https://cdn.example.cl/p/1-400.webp 400w, https://cdn.example.cl/p/1-800.webp 800w"></picture></div>"#,
        );
        assert_eq!(
            resolve_image(&c).as_deref(),
            Some("https://cdn.example.cl/p/1-400.webp")
        );

        let lazy = card(r#"<div><img data-src="https://cdn.example.cl/p/2.jpg"></div>"#);
        assert_eq!(
            resolve_image(&lazy).as_deref(),
            Some("https://cdn.example.cl/p/2.jpg")
        );
    }

    #[test]
    fn no_images() {
        assert!(resolve_image(&card("<div><h3>x</h3></div>")).is_none());
    }
}
