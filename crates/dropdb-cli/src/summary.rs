//! End-of-invocation report. Printed whether or not provider runs failed.

use std::path::PathBuf;

use dropdb_db::IngestSummary;
use dropdb_scraper::ProviderScrape;

/// One provider that did not produce a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProviderFailure {
    pub url: String,
    pub reason: String,
}

/// Scrape-stage totals across every provider of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScrapeTotals {
    pub providers: usize,
    pub succeeded: usize,
    pub cards_seen: usize,
    pub products: usize,
    pub skipped_unnamed: usize,
    pub skipped_duplicate: usize,
    pub with_stock: usize,
    pub with_href: usize,
    pub with_id: usize,
    pub failures: Vec<ProviderFailure>,
    pub run_dirs: Vec<PathBuf>,
}

impl ScrapeTotals {
    pub(crate) fn new(providers: usize) -> Self {
        Self {
            providers,
            ..Self::default()
        }
    }

    pub(crate) fn record_success(&mut self, scrape: &ProviderScrape, run_dir: PathBuf) {
        let stats = scrape.stats;
        self.succeeded += 1;
        self.cards_seen += stats.cards_seen;
        self.products += stats.emitted;
        self.skipped_unnamed += stats.skipped_unnamed;
        self.skipped_duplicate += stats.skipped_duplicate;
        self.with_stock += stats.counts.with_stock;
        self.with_href += stats.counts.with_href;
        self.with_id += stats.counts.with_id;
        self.run_dirs.push(run_dir);
    }

    pub(crate) fn record_failure(&mut self, url: &str, reason: String) {
        self.failures.push(ProviderFailure {
            url: url.to_string(),
            reason,
        });
    }

    /// `true` when there was work to do and none of it produced a run.
    pub(crate) fn all_failed(&self) -> bool {
        self.providers > 0 && self.succeeded == 0
    }
}

/// Consolidation-stage totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConsolidateTotals {
    pub runs: usize,
    pub records: usize,
    pub by_locale: Vec<(String, usize)>,
    pub master_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InvocationSummary {
    pub scrape: Option<ScrapeTotals>,
    pub consolidate: Option<ConsolidateTotals>,
    pub ingest: Option<IngestSummary>,
    pub dry_run: bool,
}

impl InvocationSummary {
    pub(crate) fn render(&self) -> String {
        let mut lines = vec!["== summary ==".to_string()];

        if let Some(s) = &self.scrape {
            lines.push(format!(
                "providers: {} ok / {} failed / {} total",
                s.succeeded,
                s.failures.len(),
                s.providers
            ));
            lines.push(format!(
                "cards seen: {} | products: {} | skipped unnamed: {} | skipped duplicate: {}",
                s.cards_seen, s.products, s.skipped_unnamed, s.skipped_duplicate
            ));
            lines.push(format!(
                "with stock: {} | with href: {} | with product id: {}",
                s.with_stock, s.with_href, s.with_id
            ));
            for failure in &s.failures {
                lines.push(format!("  failed {}: {}", failure.url, failure.reason));
            }
        }

        if let Some(c) = &self.consolidate {
            lines.push(format!(
                "master: {} records from {} runs",
                c.records, c.runs
            ));
            for (locale, count) in &c.by_locale {
                lines.push(format!("  {locale}: {count}"));
            }
            if let Some(path) = &c.master_json {
                lines.push(format!("  written to {}", path.display()));
            }
        }

        if let Some(i) = &self.ingest {
            let label = if self.dry_run { "ingest (dry-run)" } else { "ingest" };
            lines.push(format!("{label}: {} records", i.records));
            lines.push(format!(
                "providers: {} inserted / {} updated",
                i.providers_inserted, i.providers_updated
            ));
            lines.push(format!(
                "products: {} inserted / {} updated in {} batches ({} via fallback)",
                i.products_inserted, i.products_updated, i.batches, i.fallback_batches
            ));
            lines.push(format!(
                "skipped: {} unresolved provider / {} missing product id / {} collapsed duplicates",
                i.skipped_unresolved_provider, i.skipped_missing_product_id, i.collapsed_duplicates
            ));
        }

        lines.join("\n")
    }

    pub(crate) fn print(&self) {
        println!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_failed_requires_work() {
        assert!(!ScrapeTotals::new(0).all_failed());

        let mut totals = ScrapeTotals::new(2);
        totals.record_failure("https://a.example.cl", "timed out".to_string());
        totals.record_failure("https://b.example.cl", "navigation failed".to_string());
        assert!(totals.all_failed());
    }

    #[test]
    fn render_lists_failures_and_ingest_skips() {
        let mut totals = ScrapeTotals::new(1);
        totals.record_failure("https://a.example.cl/provider/9", "timed out".to_string());
        let summary = InvocationSummary {
            scrape: Some(totals),
            consolidate: None,
            ingest: Some(IngestSummary {
                records: 10,
                skipped_unresolved_provider: 2,
                ..IngestSummary::default()
            }),
            dry_run: true,
        };

        let text = summary.render();
        assert!(text.contains("providers: 0 ok / 1 failed / 1 total"));
        assert!(text.contains("failed https://a.example.cl/provider/9: timed out"));
        assert!(text.contains("ingest (dry-run): 10 records"));
        assert!(text.contains("skipped: 2 unresolved provider"));
    }
}
