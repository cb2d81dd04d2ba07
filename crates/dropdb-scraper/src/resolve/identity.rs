//! Product identity: numeric product id plus an absolute detail-page link.

use std::sync::LazyLock;

use regex::Regex;

use dropdb_core::urls::slugify;

use crate::card::CardHandle;
use crate::resolve::{first_match, image, name, selectors, Strategy};

/// Detail-page path patterns, tried in order against a candidate href.
static PRODUCT_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)/product-details/(\d+)(?:[/?]|$)",
        r"(?i)[?&](?:productId|id)=(\d+)",
        r"(?i)/products?/(\d+)(?:[/?]|$)",
        r"(?i)/product/(\d+)(?:[/?]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static ONCLICK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)product-details/(\d+)|product/(\d+)").expect("valid regex")
});

static MARKUP_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:/dashboard)?/product-details/(\d+)(?:[/?"]|$)"#).expect("valid regex")
});

static IMAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/products/(\d+)/").expect("valid regex"));

const ID_ATTRIBUTES: &[&str] = &["data-product-id", "data-id", "ng-reflect-product-id"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductIdentity {
    pub product_id: i64,
    /// Absolute against the page origin.
    pub href: String,
}

const STRATEGIES: &[Strategy<ProductIdentity>] = &[
    product_anchor,
    any_matching_anchor,
    router_link,
    inline_handler,
    id_attribute,
    markup_scan,
    image_segment,
];

#[must_use]
pub fn resolve_identity(card: &CardHandle) -> Option<ProductIdentity> {
    first_match(card, STRATEGIES)
}

/// Product id embedded in a detail-page URL.
#[must_use]
pub fn product_id_from_href(href: &str) -> Option<i64> {
    PRODUCT_ID_RES
        .iter()
        .find_map(|re| re.captures(href)?.get(1)?.as_str().parse().ok())
}

fn identity_from_href(card: &CardHandle, raw: &str) -> Option<ProductIdentity> {
    let href = card.absolutize(raw)?;
    let product_id = product_id_from_href(&href)?;
    Some(ProductIdentity { product_id, href })
}

fn synthesized(card: &CardHandle, product_id: i64, suffix: Option<&str>) -> Option<ProductIdentity> {
    let path = match suffix {
        Some(slug) if !slug.is_empty() => format!("/dashboard/product-details/{product_id}/{slug}"),
        _ => format!("/dashboard/product-details/{product_id}"),
    };
    Some(ProductIdentity {
        product_id,
        href: card.absolutize(&path)?,
    })
}

/// (1) The first anchor that looks like a product link.
fn product_anchor(card: &CardHandle) -> Option<ProductIdentity> {
    let anchor = card.first(&selectors::PRODUCT_ANCHOR)?;
    identity_from_href(card, anchor.value().attr("href")?)
}

/// (2) Any anchor whose href carries a product id.
fn any_matching_anchor(card: &CardHandle) -> Option<ProductIdentity> {
    card.select(&selectors::ANY_ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| identity_from_href(card, href))
}

/// (3) Client-side router attributes.
fn router_link(card: &CardHandle) -> Option<ProductIdentity> {
    let el = card.first(&selectors::ROUTER_LINK)?;
    let attrs = el.value();
    let link = attrs
        .attr("routerlink")
        .or_else(|| attrs.attr("ng-reflect-router-link"))?;
    identity_from_href(card, link)
}

/// (4) An inline click handler that navigates to a detail page.
fn inline_handler(card: &CardHandle) -> Option<ProductIdentity> {
    let onclick = card.attr("onclick")?;
    let caps = ONCLICK_ID_RE.captures(onclick)?;
    let id = caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()?;
    synthesized(card, id, None)
}

/// (5) A data attribute or `id="product_N"` carrying the id directly.
fn id_attribute(card: &CardHandle) -> Option<ProductIdentity> {
    let from_attrs = ID_ATTRIBUTES
        .iter()
        .filter_map(|name| card.attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()));
    let raw = from_attrs.or_else(|| {
        card.root()?
            .value()
            .id()?
            .strip_prefix("product_")
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
    })?;
    synthesized(card, raw.parse().ok()?, None)
}

/// (6) The detail path anywhere in the serialized markup.
fn markup_scan(card: &CardHandle) -> Option<ProductIdentity> {
    let id = MARKUP_ID_RE.captures(card.html())?.get(1)?.as_str().parse().ok()?;
    synthesized(card, id, None)
}

/// (7) The id segment of a product image URL; the href is synthesized from
/// id and slugified name.
fn image_segment(card: &CardHandle) -> Option<ProductIdentity> {
    let src = image::resolve_image(card)?;
    let id = IMAGE_ID_RE.captures(&src)?.get(1)?.as_str().parse().ok()?;
    let slug = name::resolve_name(card).map(|n| slugify(&n));
    synthesized(card, id, slug.as_deref())
}
