//! Page-driven product extraction for provider storefronts.

#[cfg(feature = "browser")]
pub mod browser;
pub mod canvas;
pub mod card;
pub mod error;
pub mod extract;
pub mod page;
pub mod provider;
pub mod resolve;
pub mod settle;

pub use canvas::CanvasInterceptor;
pub use card::{CanvasText, CardHandle, CardSnapshot};
pub use error::ScraperError;
pub use extract::{ExtractionStats, Extractor};
pub use page::{GridPage, PageMeta, ScriptHost};
pub use provider::{scrape_provider, ProviderScrape, ScrapeSettings};
pub use settle::{settle, SettleConfig, SettleOutcome};
