//! Price extraction.
//!
//! Cards print a provider price and a suggested retail price with no
//! reliable labels. [`first_two_currency_tokens`] takes the first two
//! distinct currency-formatted tokens in reading order as provider price
//! and suggested price respectively. This positional rule is brittle: a card
//! that prints a third amount first (a discount, a shipping fee) will be
//! misread. It is kept as-is so extracted data stays comparable across runs.
//! Numeric parsing of the tokens happens at ingest via
//! [`dropdb_core::parse_price`].

use std::sync::LazyLock;

use regex::Regex;

use crate::card::CardHandle;

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\$|\bCLP\b|\bMXN\b|\bCOP\b|\bPEN\b|\bPYG\b)\s*\d[\d.,]*")
        .expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardPrices {
    pub provider: Option<String>,
    pub suggested: Option<String>,
}

/// Prices from the card's visible and canvas-drawn text.
#[must_use]
pub fn resolve_prices(card: &CardHandle) -> CardPrices {
    first_two_currency_tokens(&card.combined_text())
}

/// The first two distinct currency tokens of `text`, in order of appearance.
#[must_use]
pub fn first_two_currency_tokens(text: &str) -> CardPrices {
    let mut tokens: Vec<&str> = Vec::with_capacity(2);
    for m in MONEY_RE.find_iter(text) {
        let token = m.as_str().trim();
        if token.is_empty() || tokens.contains(&token) {
            continue;
        }
        tokens.push(token);
        if tokens.len() == 2 {
            break;
        }
    }
    CardPrices {
        provider: tokens.first().map(|s| (*s).to_string()),
        suggested: tokens.get(1).map(|s| (*s).to_string()),
    }
}
