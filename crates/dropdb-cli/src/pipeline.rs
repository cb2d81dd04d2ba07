//! Scrape and consolidate stages.
//!
//! Provider failures are logged and counted rather than propagated so one
//! unresponsive provider does not abort the rest of the invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};

use dropdb_core::{load_provider_targets, AppConfig, ProviderTarget};
use dropdb_master::{build_master, write_master, MasterDataset, RunStore};
use dropdb_scraper::browser::{BrowserSession, BrowserSettings};
use dropdb_scraper::{
    scrape_provider, CanvasInterceptor, ProviderScrape, ScrapeSettings, ScraperError, ScriptHost,
};

use crate::summary::{ConsolidateTotals, ScrapeTotals};

/// Flags shared by `scrape` and `run`.
#[derive(Debug, Clone, Default, Args)]
pub struct ScrapeArgs {
    /// Provider URL list, or a directory of `providers_XX.txt` files
    #[arg(long)]
    pub providers: Option<PathBuf>,

    /// Only scrape the partition for this country code (e.g. CL)
    #[arg(long)]
    pub locale: Option<String>,

    /// Browser tabs working in parallel (1-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub concurrency: Option<u8>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

/// Outcome of one provider: the written run, or why there is none.
enum ProviderOutcome {
    Ok {
        scrape: Box<ProviderScrape>,
        run_dir: PathBuf,
    },
    Err(anyhow::Error),
}

/// Resolves the provider list for an invocation.
///
/// # Errors
///
/// Returns the [`dropdb_core::ConfigError`] that aborts the invocation when
/// no provider URL is found.
pub(crate) fn resolve_targets(
    config: &AppConfig,
    args: &ScrapeArgs,
) -> anyhow::Result<Vec<ProviderTarget>> {
    let path = args
        .providers
        .clone()
        .unwrap_or_else(|| config.providers_path.clone());
    Ok(load_provider_targets(&path, args.locale.as_deref())?)
}

/// Scrapes every target with a bounded pool of browser tabs and writes one
/// run per provider under the output directory.
///
/// # Errors
///
/// Returns an error only for fatal configuration problems. A browser that
/// fails to launch marks every provider as failed instead.
pub(crate) async fn run_scrape(
    config: &AppConfig,
    args: &ScrapeArgs,
) -> anyhow::Result<ScrapeTotals> {
    let targets = resolve_targets(config, args)?;
    let concurrency = args
        .concurrency
        .map_or(config.concurrency, usize::from)
        .max(1);

    let mut browser_settings = BrowserSettings::from_app_config(config);
    if args.headful {
        browser_settings.headless = false;
    }
    let settings = ScrapeSettings::from_app_config(config);
    let store = RunStore::new(&config.out_dir);
    let interceptor = CanvasInterceptor::new();
    let provider_timeout = Duration::from_secs(config.provider_timeout_secs);
    let mut totals = ScrapeTotals::new(targets.len());

    tracing::info!(
        providers = targets.len(),
        concurrency,
        headless = browser_settings.headless,
        out_dir = %config.out_dir.display(),
        "starting scrape"
    );

    let session = match BrowserSession::launch(&browser_settings).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "browser failed to launch");
            for target in &targets {
                totals.record_failure(&target.url, format!("browser failed to launch: {err}"));
            }
            return Ok(totals);
        }
    };

    let progress = progress_bar(targets.len());
    let results: Vec<(&ProviderTarget, ProviderOutcome)> = stream::iter(&targets)
        .map(|target| {
            let fut = scrape_one(
                &session,
                &interceptor,
                &store,
                target,
                &settings,
                provider_timeout,
            );
            async move { (target, fut.await) }
        })
        .buffer_unordered(concurrency)
        .inspect(|(target, _)| {
            progress.set_message(target.url.clone());
            progress.inc(1);
        })
        .collect()
        .await;
    progress.finish_and_clear();
    session.close().await;

    for (target, outcome) in results {
        match outcome {
            ProviderOutcome::Ok { scrape, run_dir } => totals.record_success(&scrape, run_dir),
            ProviderOutcome::Err(err) => totals.record_failure(&target.url, format!("{err:#}")),
        }
    }
    totals.failures.sort_by(|a, b| a.url.cmp(&b.url));
    totals.run_dirs.sort();

    if !totals.failures.is_empty() {
        tracing::warn!(
            failed_providers = totals.failures.len(),
            total_providers = totals.providers,
            "some providers failed during scrape"
        );
    }
    Ok(totals)
}

/// Drives one provider in its own tab. The tab is closed and its canvas
/// capture registration released whatever the outcome.
async fn scrape_one(
    session: &BrowserSession,
    interceptor: &CanvasInterceptor,
    store: &RunStore,
    target: &ProviderTarget,
    settings: &ScrapeSettings,
    provider_timeout: Duration,
) -> ProviderOutcome {
    let page = match session.new_page().await {
        Ok(page) => page,
        Err(err) => return ProviderOutcome::Err(err.into()),
    };
    let context_id = page.context_id();

    let scraped = tokio::time::timeout(
        provider_timeout,
        scrape_provider(&page, interceptor, target, settings),
    )
    .await;

    if let Err(err) = page.close().await {
        tracing::warn!(provider_url = %target.url, error = %err, "tab close failed");
    }
    interceptor.release(&context_id);

    let scrape = match scraped {
        Ok(Ok(scrape)) => scrape,
        Ok(Err(err)) => {
            tracing::error!(provider_url = %target.url, error = %err, "provider run abandoned");
            return ProviderOutcome::Err(err.into());
        }
        Err(_) => {
            let err = ScraperError::Timeout {
                stage: "scraping provider".to_string(),
                secs: provider_timeout.as_secs(),
            };
            tracing::error!(provider_url = %target.url, error = %err, "provider run abandoned");
            return ProviderOutcome::Err(err.into());
        }
    };

    match store.write(&scrape.run) {
        Ok(run_dir) => {
            tracing::info!(
                provider_url = %target.url,
                products = scrape.run.items.len(),
                run_dir = %run_dir.display(),
                "provider run written"
            );
            ProviderOutcome::Ok {
                scrape: Box::new(scrape),
                run_dir,
            }
        }
        Err(err) => ProviderOutcome::Err(err.into()),
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(u64::try_from(len).unwrap_or(u64::MAX));
    match ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:32} {pos}/{len} {wide_msg}")
    {
        Ok(style) => progress.with_style(style),
        Err(err) => {
            tracing::debug!(error = %err, "progress style rejected; using default");
            progress
        }
    }
}

/// Merges every provider run under `out_dir` into a new master dataset.
///
/// # Errors
///
/// Returns an error if the output directory cannot be listed, no run is
/// found, or the master files cannot be written.
pub(crate) fn run_consolidate(
    out_dir: &Path,
) -> anyhow::Result<(ConsolidateTotals, MasterDataset)> {
    let store = RunStore::new(out_dir);
    let dataset = build_master(&store)?;
    if dataset.meta.runs == 0 {
        anyhow::bail!("no provider runs found under {}", out_dir.display());
    }
    let paths = write_master(out_dir, &dataset)?;

    tracing::info!(
        runs = dataset.meta.runs,
        records = dataset.meta.total,
        master = %paths.json.display(),
        "master dataset written"
    );

    let totals = ConsolidateTotals {
        runs: dataset.meta.runs,
        records: dataset.meta.total,
        by_locale: dataset
            .meta
            .by_locale
            .iter()
            .map(|(locale, count)| (locale.clone(), *count))
            .collect(),
        master_json: Some(paths.json),
    };
    Ok((totals, dataset))
}
