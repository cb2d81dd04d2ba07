//! Card snapshots and the read-only handle resolvers work against.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use dropdb_core::urls::{absolutize, normalize_whitespace};

/// Text drawn onto one canvas nested in a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasText {
    pub texts: Vec<String>,
    /// The canvas sits inside a stock-labeled element.
    #[serde(default)]
    pub stock_scoped: bool,
}

/// One card as captured from the live page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSnapshot {
    /// The card's `outerHTML`.
    pub html: String,
    /// The card's rendered `innerText`.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub canvases: Vec<CanvasText>,
}

/// A parsed card plus the page origin used to absolutize links.
pub struct CardHandle {
    fragment: Html,
    html: String,
    text: String,
    canvases: Vec<CanvasText>,
    origin: Url,
}

impl CardHandle {
    #[must_use]
    pub fn new(snapshot: CardSnapshot, origin: Url) -> Self {
        let fragment = Html::parse_fragment(&snapshot.html);
        let text = if snapshot.text.trim().is_empty() {
            normalize_whitespace(&fragment.root_element().text().collect::<String>())
        } else {
            snapshot.text
        };
        Self {
            fragment,
            html: snapshot.html,
            text,
            canvases: snapshot.canvases,
            origin,
        }
    }

    /// The card element itself.
    #[must_use]
    pub fn root(&self) -> Option<ElementRef<'_>> {
        self.fragment
            .root_element()
            .children()
            .find_map(ElementRef::wrap)
    }

    /// Descendants of the card matching `selector`, in document order.
    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let root = self.root();
        root.into_iter()
            .flat_map(move |r| r.select(selector).filter(move |el| el.id() != r.id()))
    }

    #[must_use]
    pub fn first<'a>(&'a self, selector: &'a Selector) -> Option<ElementRef<'a>> {
        self.select(selector).next()
    }

    /// `name` on the card element, else on its first descendant carrying it.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        let root = self.root()?;
        if let Some(value) = root.value().attr(name) {
            return Some(value);
        }
        let selector = Selector::parse(&format!("[{name}]")).ok()?;
        root.select(&selector)
            .find_map(|el| el.value().attr(name))
    }

    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Rendered text of the whole card.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text from every canvas in the card, space-joined.
    #[must_use]
    pub fn canvas_text(&self) -> String {
        self.canvases
            .iter()
            .flat_map(|c| c.texts.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text drawn on the first stock-scoped canvas, if it drew anything.
    #[must_use]
    pub fn stock_canvas_text(&self) -> Option<String> {
        let canvas = self.canvases.iter().find(|c| c.stock_scoped)?;
        (!canvas.texts.is_empty()).then(|| canvas.texts.join(" "))
    }

    /// Visible text followed by canvas text.
    #[must_use]
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.text, self.canvas_text())
    }

    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    #[must_use]
    pub fn absolutize(&self, href: &str) -> Option<String> {
        absolutize(href, &self.origin)
    }
}

/// Whitespace-normalized text content of an element.
#[must_use]
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<String>())
}
