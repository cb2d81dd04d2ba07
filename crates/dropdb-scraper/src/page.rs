//! The seam between extraction logic and a live browsing context.
//!
//! Everything above this trait is deterministic and testable with fakes.
//! The Chromium-backed implementation lives in [`crate::browser`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::card::CardSnapshot;
use crate::error::ScraperError;

/// Page-level facts read after settling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageMeta {
    /// Text of the first `h1`/`h2`, if any.
    #[serde(default)]
    pub heading: Option<String>,
    pub url: String,
    pub origin: String,
}

/// Accepts scripts that run before any page script on every new document.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Stable identifier of the browsing context the script lands in.
    fn context_id(&self) -> String;

    async fn add_init_script(&self, source: &str) -> Result<(), ScraperError>;
}

/// A page showing a lazily loaded product grid.
#[async_trait]
pub trait GridPage: ScriptHost {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError>;

    /// Returns `false` if `selector` matched nothing within `timeout`.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError>;

    async fn scroll_by(&self, dy: u32) -> Result<(), ScraperError>;

    async fn scroll_height(&self) -> Result<u64, ScraperError>;

    async fn count_cards(&self, selector: &str) -> Result<usize, ScraperError>;

    /// Clicks the first visible button whose text matches one of `labels`.
    /// Returns whether a click was dispatched.
    async fn click_load_more(&self, labels: &[String]) -> Result<bool, ScraperError>;

    /// Waits for network quiescence. Returns `false` if `timeout` elapsed first.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<bool, ScraperError>;

    /// Opens the grid's order dropdown and picks `label`. Returns `false`
    /// when no such entry exists.
    async fn apply_sort(&self, label: &str) -> Result<bool, ScraperError>;

    async fn page_meta(&self) -> Result<PageMeta, ScraperError>;

    async fn snapshot_cards(&self, selector: &str) -> Result<Vec<CardSnapshot>, ScraperError>;
}
