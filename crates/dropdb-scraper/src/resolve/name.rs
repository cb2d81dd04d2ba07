use crate::card::{element_text, CardHandle};
use crate::resolve::selectors;

/// The card's product name, whitespace-normalized. `None` when the first
/// title element is missing or blank; such cards are skipped.
#[must_use]
pub fn resolve_name(card: &CardHandle) -> Option<String> {
    let name = element_text(card.first(&selectors::NAME)?);
    (!name.is_empty()).then_some(name)
}

/// Provider name as printed on the card, if any.
#[must_use]
pub fn resolve_card_provider(card: &CardHandle) -> Option<String> {
    let name = element_text(card.first(&selectors::CARD_PROVIDER)?);
    (!name.is_empty()).then_some(name)
}
