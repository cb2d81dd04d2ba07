//! Chromium-backed [`GridPage`] over the DevTools protocol.

mod scripts;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use dropdb_core::AppConfig;

use crate::card::CardSnapshot;
use crate::error::ScraperError;
use crate::page::{GridPage, PageMeta, ScriptHost};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Launch options for the shared browser.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub profile_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
}

impl BrowserSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            headless: config.headless,
            profile_dir: config.browser_profile_dir.clone(),
            chrome_path: config.chrome_path.clone(),
        }
    }
}

/// One browser process with a persistent profile, shared across providers.
///
/// The profile directory carries the authenticated storefront session, so
/// every page opened here is logged in.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    next_page: AtomicU64,
}

impl BrowserSession {
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if the profile directory cannot be
    /// created or Chromium fails to start.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, ScraperError> {
        std::fs::create_dir_all(&settings.profile_dir).map_err(|e| {
            ScraperError::Browser(format!(
                "cannot create profile dir {}: {e}",
                settings.profile_dir.display()
            ))
        })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&settings.profile_dir)
            .window_size(1366, 900)
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScraperError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(error = %err, "browser handler event error");
                }
            }
        });
        tracing::info!(
            headless = settings.headless,
            profile_dir = %settings.profile_dir.display(),
            "browser launched"
        );

        Ok(Self {
            browser,
            handler,
            next_page: AtomicU64::new(1),
        })
    }

    /// Opens a fresh tab.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if the target cannot be created.
    pub async fn new_page(&self) -> Result<ChromePage, ScraperError> {
        let page = self.browser.new_page("about:blank").await?;
        let n = self.next_page.fetch_add(1, Ordering::Relaxed);
        Ok(ChromePage {
            page,
            context_id: format!("page-{n}"),
        })
    }

    /// Closes the browser and stops the event handler.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            tracing::warn!(error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// One tab.
pub struct ChromePage {
    page: Page,
    context_id: String,
}

impl ChromePage {
    async fn eval<T: DeserializeOwned>(
        &self,
        script: &'static str,
        source: String,
    ) -> Result<T, ScraperError> {
        let result = self
            .page
            .evaluate(source)
            .await
            .map_err(|e| ScraperError::Evaluate {
                script,
                reason: e.to_string(),
            })?;
        result.into_value::<T>().map_err(|e| ScraperError::Decode {
            context: format!("result of `{script}`"),
            source: e,
        })
    }

    /// Closes the tab.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if the target refuses to close.
    pub async fn close(self) -> Result<(), ScraperError> {
        self.page.close().await?;
        Ok(())
    }
}

#[async_trait]
impl ScriptHost for ChromePage {
    fn context_id(&self) -> String {
        self.context_id.clone()
    }

    async fn add_init_script(&self, source: &str) -> Result<(), ScraperError> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GridPage for ChromePage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(ScraperError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(ScraperError::Timeout {
                stage: format!("navigating to {url}"),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError> {
        let deadline = Instant::now() + timeout;
        let check = scripts::selector_present(selector);
        loop {
            if self.eval::<bool>("selector_present", check.clone()).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn scroll_by(&self, dy: u32) -> Result<(), ScraperError> {
        self.eval::<bool>("scroll_by", scripts::scroll_by(dy)).await?;
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64, ScraperError> {
        self.eval("scroll_height", scripts::SCROLL_HEIGHT.to_string())
            .await
    }

    async fn count_cards(&self, selector: &str) -> Result<usize, ScraperError> {
        self.eval("count_cards", scripts::count_cards(selector)).await
    }

    async fn click_load_more(&self, labels: &[String]) -> Result<bool, ScraperError> {
        self.eval("click_load_more", scripts::click_load_more(labels))
            .await
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<bool, ScraperError> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.eval("wait_for_idle", scripts::wait_for_idle(millis))
            .await
    }

    async fn apply_sort(&self, label: &str) -> Result<bool, ScraperError> {
        let sorted: bool = self.eval("apply_sort", scripts::apply_sort(label)).await?;
        if sorted {
            self.wait_for_idle(Duration::from_secs(4)).await?;
        }
        Ok(sorted)
    }

    async fn page_meta(&self) -> Result<PageMeta, ScraperError> {
        self.eval("page_meta", scripts::PAGE_META.to_string()).await
    }

    async fn snapshot_cards(&self, selector: &str) -> Result<Vec<CardSnapshot>, ScraperError> {
        self.eval("snapshot_cards", scripts::snapshot_cards(selector))
            .await
    }
}
