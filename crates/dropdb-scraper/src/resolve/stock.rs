use std::sync::LazyLock;

use regex::Regex;

use crate::card::{element_text, CardHandle};
use crate::resolve::{first_match, selectors, Strategy};

static SHORT_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,6}\b").expect("valid regex"));

static ALL_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Labeled-number patterns, tried in order. Dots inside the captured number
/// are thousands separators.
static LABELED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Stock[:\s]*([\d.]+)",
        r"(?i)Disponible[:\s]*([\d.]+)",
        r"(?i)Unidades[:\s]*([\d.]+)",
        r"(?i)\b(\d{1,6})\s*unidades\b",
        r"(?i)\b(\d{1,6})\s*disponibles\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

const STRATEGIES: &[Strategy<i64>] = &[
    canvas_stock,
    data_attribute_stock,
    stock_element_text,
    labeled_text_stock,
];

/// Units in stock. `None` means no signal at all, which is not zero.
#[must_use]
pub fn resolve_stock(card: &CardHandle) -> Option<i64> {
    first_match(card, STRATEGIES)
}

/// Short number drawn on a canvas inside a stock-labeled element.
fn canvas_stock(card: &CardHandle) -> Option<i64> {
    let drawn = card.stock_canvas_text()?;
    SHORT_NUMBER_RE.find(&drawn)?.as_str().parse().ok()
}

fn data_attribute_stock(card: &CardHandle) -> Option<i64> {
    let raw = card.attr("data-stock")?.trim();
    ALL_DIGITS_RE
        .is_match(raw)
        .then(|| raw.parse().ok())
        .flatten()
}

fn stock_element_text(card: &CardHandle) -> Option<i64> {
    let text = element_text(card.first(&selectors::STOCK)?);
    SHORT_NUMBER_RE.find(&text)?.as_str().parse().ok()
}

fn labeled_text_stock(card: &CardHandle) -> Option<i64> {
    let text = card.combined_text();
    LABELED_PATTERNS.iter().find_map(|re| {
        let captured = re.captures(&text)?.get(1)?.as_str().replace('.', "");
        captured.parse().ok()
    })
}
