//! Render settling: drive a lazily loaded grid until it stops growing.

use std::time::Duration;

use crate::error::ScraperError;
use crate::page::GridPage;

#[derive(Debug, Clone)]
pub struct SettleConfig {
    pub card_selector: String,
    pub grid_wait: Duration,
    /// Consecutive iterations without height growth before stopping.
    pub max_no_growth: u32,
    pub scroll_step_px: u32,
    pub scroll_pause: Duration,
    pub idle_timeout: Duration,
    pub load_more_labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleOutcome {
    pub grid_found: bool,
    /// Card count observed on the final iteration.
    pub item_count: usize,
    pub peak_item_count: usize,
    pub iterations: u32,
    pub load_more_clicks: u32,
}

/// Scrolls, clicks "load more" and waits for quiescence until the document
/// height has not grown for `max_no_growth` consecutive iterations.
///
/// A click alone never resets the no-growth counter; only observed height
/// growth does. A grid that never appears yields an outcome with
/// `grid_found == false` and zero items.
///
/// # Errors
///
/// Returns [`ScraperError`] if the page stops answering scroll or height
/// queries. Load-more and idle-wait failures are logged and tolerated.
pub async fn settle<P>(page: &P, config: &SettleConfig) -> Result<SettleOutcome, ScraperError>
where
    P: GridPage + ?Sized,
{
    let mut outcome = SettleOutcome::default();

    if !page
        .wait_for_selector(&config.card_selector, config.grid_wait)
        .await?
    {
        tracing::warn!(
            selector = %config.card_selector,
            wait_secs = config.grid_wait.as_secs(),
            "product grid did not appear; continuing with zero items"
        );
        return Ok(outcome);
    }
    outcome.grid_found = true;

    let mut last_height = page.scroll_height().await?;
    let mut no_growth = 0u32;

    while no_growth < config.max_no_growth {
        page.scroll_by(config.scroll_step_px).await?;
        tokio::time::sleep(config.scroll_pause).await;

        match page.click_load_more(&config.load_more_labels).await {
            Ok(true) => outcome.load_more_clicks += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "load-more click failed"),
        }

        if let Err(err) = page.wait_for_idle(config.idle_timeout).await {
            tracing::warn!(error = %err, "network idle wait failed");
        }

        let height = page.scroll_height().await?;
        let cards = page.count_cards(&config.card_selector).await?;
        outcome.iterations += 1;
        outcome.item_count = cards;
        outcome.peak_item_count = outcome.peak_item_count.max(cards);

        if height > last_height {
            no_growth = 0;
            last_height = height;
        } else {
            no_growth += 1;
        }

        tracing::debug!(
            iteration = outcome.iterations,
            height,
            cards,
            no_growth,
            "settle iteration"
        );
    }

    Ok(outcome)
}
