use dropdb_core::UNCATEGORIZED;

use crate::card::{element_text, CardHandle};
use crate::resolve::{first_match, selectors, Strategy};

const STRATEGIES: &[Strategy<String>] = &[labeled_category, chip];

/// The card's category, or [`UNCATEGORIZED`].
#[must_use]
pub fn resolve_category(card: &CardHandle) -> String {
    first_match(card, STRATEGIES).unwrap_or_else(|| UNCATEGORIZED.to_string())
}

fn labeled_category(card: &CardHandle) -> Option<String> {
    non_empty(element_text(card.first(&selectors::CATEGORY)?))
}

fn chip(card: &CardHandle) -> Option<String> {
    non_empty(element_text(card.first(&selectors::CHIP)?))
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
