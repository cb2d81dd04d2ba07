//! Field resolvers.
//!
//! Each field is resolved by an ordered list of strategies, each a pure
//! function of the card. The first strategy that yields a value wins; a
//! strategy that finds nothing returns `None` and the next one runs.
//! Resolvers never fail.

pub mod category;
pub mod identity;
pub mod image;
pub mod name;
pub mod price;
pub(crate) mod selectors;
pub mod stock;

use crate::card::CardHandle;

pub type Strategy<T> = fn(&CardHandle) -> Option<T>;

/// Runs `strategies` in order and returns the first hit.
pub fn first_match<T>(card: &CardHandle, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(card))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use url::Url;

    use crate::card::{CanvasText, CardHandle, CardSnapshot};

    pub fn origin() -> Url {
        Url::parse("https://app.example.cl/dashboard/provider/9/acme").unwrap()
    }

    pub fn card(html: &str) -> CardHandle {
        CardHandle::new(
            CardSnapshot {
                html: html.to_string(),
                ..CardSnapshot::default()
            },
            origin(),
        )
    }

    pub fn card_with_canvas(html: &str, texts: &[&str], stock_scoped: bool) -> CardHandle {
        CardHandle::new(
            CardSnapshot {
                html: html.to_string(),
                text: String::new(),
                canvases: vec![CanvasText {
                    texts: texts.iter().map(ToString::to_string).collect(),
                    stock_scoped,
                }],
            },
            origin(),
        )
    }
}
