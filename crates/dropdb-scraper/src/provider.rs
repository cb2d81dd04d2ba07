use std::time::Duration;

use chrono::Utc;
use url::Url;

use dropdb_core::urls::{provider_id_from_url, PLACEHOLDER_PROVIDER_NAME};
use dropdb_core::{detect_locale, AppConfig, ProviderMeta, ProviderRun, ProviderTarget};

use crate::canvas::CanvasInterceptor;
use crate::error::ScraperError;
use crate::extract::{ExtractionStats, Extractor};
use crate::page::{GridPage, PageMeta};
use crate::settle::{settle, SettleConfig, SettleOutcome};

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub nav_timeout: Duration,
    pub sort_label: Option<String>,
    pub settle: SettleConfig,
}

impl ScrapeSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
            sort_label: config.sort_label.clone(),
            settle: SettleConfig {
                card_selector: config.card_selector(),
                grid_wait: Duration::from_secs(config.grid_wait_secs),
                max_no_growth: config.max_no_growth,
                scroll_step_px: config.scroll_step_px,
                scroll_pause: Duration::from_millis(config.scroll_pause_ms),
                idle_timeout: Duration::from_millis(config.idle_timeout_ms),
                load_more_labels: config.load_more_labels.clone(),
            },
        }
    }
}

/// Result of one provider scrape, with diagnostics for the invocation summary.
#[derive(Debug, Clone)]
pub struct ProviderScrape {
    pub run: ProviderRun,
    pub settle: SettleOutcome,
    pub stats: ExtractionStats,
}

/// Scrapes one provider page end to end.
///
/// # Errors
///
/// Returns [`ScraperError`] when navigation fails or the page stops
/// responding. A missing grid or sort control is not an error.
pub async fn scrape_provider<P>(
    page: &P,
    interceptor: &CanvasInterceptor,
    target: &ProviderTarget,
    settings: &ScrapeSettings,
) -> Result<ProviderScrape, ScraperError>
where
    P: GridPage + ?Sized,
{
    let scraped_at = Utc::now();
    interceptor.install(page).await?;

    tracing::info!(provider_url = %target.url, "scraping provider");
    page.navigate(&target.url, settings.nav_timeout).await?;

    if let Some(label) = settings.sort_label.as_deref() {
        match page.apply_sort(label).await {
            Ok(true) => tracing::debug!(label, "grid sorted"),
            Ok(false) => tracing::warn!(label, provider_url = %target.url, "sort control not found"),
            Err(err) => tracing::warn!(label, error = %err, "sorting failed"),
        }
    }

    let outcome = settle(page, &settings.settle).await?;
    let page_meta = page.page_meta().await?;
    let origin = Url::parse(&page_meta.origin).map_err(|e| ScraperError::InvalidUrl {
        url: page_meta.origin.clone(),
        reason: e.to_string(),
    })?;
    let meta = provider_meta(target, &page_meta, scraped_at);

    let snapshots = if outcome.grid_found {
        page.snapshot_cards(&settings.settle.card_selector).await?
    } else {
        Vec::new()
    };

    let mut extractor = Extractor::new();
    let items = extractor.extract(snapshots, &origin, &meta);
    let stats = extractor.stats();
    tracing::info!(
        provider = %meta.provider_name,
        provider_id = ?meta.provider_id,
        cards = stats.cards_seen,
        products = stats.emitted,
        with_stock = stats.counts.with_stock,
        with_href = stats.counts.with_href,
        "provider extracted"
    );

    Ok(ProviderScrape {
        run: ProviderRun::new(meta, items),
        settle: outcome,
        stats,
    })
}

fn provider_meta(
    target: &ProviderTarget,
    page: &PageMeta,
    scraped_at: chrono::DateTime<Utc>,
) -> ProviderMeta {
    let provider_name = page
        .heading
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(PLACEHOLDER_PROVIDER_NAME)
        .to_string();
    let provider_id = provider_id_from_url(&page.url).or_else(|| provider_id_from_url(&target.url));
    let locale = target
        .locale
        .clone()
        .or_else(|| detect_locale([page.url.as_str(), target.url.as_str()]).map(str::to_string));
    let provider_url = Some(page.url.trim())
        .filter(|u| !u.is_empty())
        .unwrap_or(target.url.as_str())
        .to_string();
    ProviderMeta {
        provider_name,
        provider_id,
        provider_url,
        locale,
        scraped_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str, locale: Option<&str>) -> ProviderTarget {
        ProviderTarget {
            url: url.to_string(),
            locale: locale.map(str::to_string),
        }
    }

    #[test]
    fn meta_prefers_heading_and_partition_locale() {
        let page = PageMeta {
            heading: Some("  Acme Store ".to_string()),
            url: "https://app.example.com/dashboard/provider/42/acme".to_string(),
            origin: "https://app.example.com".to_string(),
        };
        let meta = provider_meta(
            &target("https://app.example.com/dashboard/provider/42/acme", Some("mexico")),
            &page,
            Utc::now(),
        );
        assert_eq!(meta.provider_name, "Acme Store");
        assert_eq!(meta.provider_id, Some(42));
        assert_eq!(meta.locale.as_deref(), Some("mexico"));
    }

    #[test]
    fn meta_falls_back_to_placeholder_and_detected_locale() {
        let page = PageMeta {
            heading: None,
            url: "https://app.example.cl/dashboard/catalog".to_string(),
            origin: "https://app.example.cl".to_string(),
        };
        let meta = provider_meta(
            &target("https://app.example.cl/dashboard/provider/7", None),
            &page,
            Utc::now(),
        );
        assert_eq!(meta.provider_name, PLACEHOLDER_PROVIDER_NAME);
        assert_eq!(meta.provider_id, Some(7));
        assert_eq!(meta.locale.as_deref(), Some("chile"));
    }

    #[test]
    fn meta_url_is_the_page_the_browser_settled_on() {
        let page = PageMeta {
            heading: Some("Acme".to_string()),
            url: "https://app.example.cl/dashboard/provider/7/acme?tab=catalog".to_string(),
            origin: "https://app.example.cl".to_string(),
        };
        let meta = provider_meta(
            &target("https://app.example.cl/dashboard/provider/7", None),
            &page,
            Utc::now(),
        );
        assert_eq!(
            meta.provider_url,
            "https://app.example.cl/dashboard/provider/7/acme?tab=catalog"
        );

        let blank = PageMeta {
            url: "  ".to_string(),
            ..page
        };
        let meta = provider_meta(
            &target("https://app.example.cl/dashboard/provider/7", None),
            &blank,
            Utc::now(),
        );
        assert_eq!(meta.provider_url, "https://app.example.cl/dashboard/provider/7");
    }
}
