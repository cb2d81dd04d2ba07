use super::*;

use std::path::Path;

use chrono::{DateTime, Utc};
use dropdb_core::{Environment, ProviderMeta, ProviderRun, ScrapedProduct};
use dropdb_master::RunStore;

fn config(out_dir: &Path) -> AppConfig {
    AppConfig {
        database_url: None,
        env: Environment::Test,
        log_level: "info".to_string(),
        providers_path: out_dir.join("providers.txt"),
        out_dir: out_dir.to_path_buf(),
        headless: true,
        browser_profile_dir: out_dir.join(".profile"),
        chrome_path: None,
        concurrency: 1,
        nav_timeout_secs: 90,
        grid_wait_secs: 15,
        idle_timeout_ms: 2_500,
        provider_timeout_secs: 900,
        max_no_growth: 18,
        scroll_step_px: 2_800,
        scroll_pause_ms: 900,
        card_selectors: vec![".product-card".to_string()],
        load_more_labels: vec!["Load more".to_string()],
        sort_label: None,
        upsert_batch_size: 700,
        store_max_retries: 0,
        store_backoff_base_secs: 0,
        db_max_connections: 2,
        db_min_connections: 1,
        db_acquire_timeout_secs: 1,
    }
}

fn product(provider_url: &str, product_id: Option<i64>, stock: Option<i64>) -> ScrapedProduct {
    ScrapedProduct {
        provider_name: "Acme".to_string(),
        provider_id: Some(9),
        provider_url: provider_url.to_string(),
        product_id,
        name: format!("Widget {}", product_id.unwrap_or_default()),
        category: "Hogar".to_string(),
        price_provider: Some("$ 12.990".to_string()),
        price_suggested: None,
        stock,
        image: None,
        href: product_id
            .map(|id| format!("https://app.example.cl/dashboard/product-details/{id}")),
        locale: Some("chile".to_string()),
        card_provider_name: None,
        scraped_at: None,
    }
}

fn write_run(out_dir: &Path, at: &str, items: Vec<ScrapedProduct>) {
    let provider_url = "https://app.example.cl/dashboard/provider/9/acme";
    let meta = ProviderMeta {
        provider_name: "Acme".to_string(),
        provider_id: Some(9),
        provider_url: provider_url.to_string(),
        locale: Some("chile".to_string()),
        scraped_at: DateTime::parse_from_rfc3339(at)
            .unwrap()
            .with_timezone(&Utc),
    };
    RunStore::new(out_dir)
        .write(&ProviderRun::new(meta, items))
        .unwrap();
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["dropdb-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["dropdb-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_prune_no_country_command() {
    let cli = Cli::try_parse_from(["dropdb-cli", "db", "prune-no-country"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::PruneNoCountry
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["dropdb-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn scrape_defaults_leave_config_in_charge() {
    let cli = Cli::try_parse_from(["dropdb-cli", "scrape"]).unwrap();
    let Some(Commands::Scrape { scrape }) = cli.command else {
        panic!("expected scrape command");
    };
    assert!(scrape.providers.is_none());
    assert!(scrape.locale.is_none());
    assert!(scrape.concurrency.is_none());
    assert!(!scrape.headful);
}

#[test]
fn scrape_accepts_every_flag() {
    let cli = Cli::try_parse_from([
        "dropdb-cli",
        "scrape",
        "--providers",
        "lists/",
        "--locale",
        "CL",
        "--concurrency",
        "5",
        "--headful",
    ])
    .unwrap();
    let Some(Commands::Scrape { scrape }) = cli.command else {
        panic!("expected scrape command");
    };
    assert_eq!(scrape.providers, Some(PathBuf::from("lists/")));
    assert_eq!(scrape.locale.as_deref(), Some("CL"));
    assert_eq!(scrape.concurrency, Some(5));
    assert!(scrape.headful);
}

#[test]
fn scrape_rejects_oversized_pool() {
    assert!(Cli::try_parse_from(["dropdb-cli", "scrape", "--concurrency", "6"]).is_err());
    assert!(Cli::try_parse_from(["dropdb-cli", "scrape", "--concurrency", "0"]).is_err());
}

#[test]
fn parses_ingest_flags() {
    let cli = Cli::try_parse_from([
        "dropdb-cli",
        "ingest",
        "--master",
        "out/master/master_20250301T100000Z.json",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Ingest {
            master: Some(ref m),
            dry_run: true,
        }) if m == Path::new("out/master/master_20250301T100000Z.json")
    ));
}

#[test]
fn parses_run_with_ingest() {
    let cli = Cli::try_parse_from(["dropdb-cli", "run", "--locale", "MX", "--ingest"]).unwrap();
    let Some(Commands::Run { scrape, ingest }) = cli.command else {
        panic!("expected run command");
    };
    assert!(ingest);
    assert_eq!(scrape.locale.as_deref(), Some("MX"));
}

#[test]
fn resolve_targets_prefers_the_flag_over_config() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("mine.txt");
    std::fs::write(
        &list,
        "# comment\nhttps://app.example.cl/dashboard/provider/9/acme\n\n",
    )
    .unwrap();
    let args = ScrapeArgs {
        providers: Some(list),
        ..ScrapeArgs::default()
    };

    let targets = pipeline::resolve_targets(&config(dir.path()), &args).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(
        targets[0].url,
        "https://app.example.cl/dashboard/provider/9/acme"
    );
}

#[test]
fn resolve_targets_fails_without_urls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("providers.txt"), "# nothing yet\n").unwrap();

    let err = pipeline::resolve_targets(&config(dir.path()), &ScrapeArgs::default()).unwrap_err();
    assert!(err.to_string().contains("provider"));
}

#[test]
fn consolidate_merges_runs_and_keeps_the_stocked_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://app.example.cl/dashboard/provider/9/acme";
    write_run(
        dir.path(),
        "2025-03-01T10:00:00Z",
        vec![product(url, Some(451), None), product(url, Some(452), None)],
    );
    write_run(
        dir.path(),
        "2025-03-02T10:00:00Z",
        vec![product(url, Some(451), Some(12))],
    );

    let (totals, dataset) = pipeline::run_consolidate(dir.path()).unwrap();
    assert_eq!(totals.runs, 2);
    assert_eq!(totals.records, 2);
    assert_eq!(totals.by_locale, vec![("chile".to_string(), 2)]);
    assert!(totals.master_json.as_ref().is_some_and(|p| p.exists()));

    let widget = dataset
        .products
        .iter()
        .find(|r| r.product.product_id == Some(451))
        .unwrap();
    assert_eq!(widget.product.stock, Some(12));
}

#[test]
fn consolidate_without_runs_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(pipeline::run_consolidate(dir.path()).is_err());
}

#[tokio::test]
async fn dry_run_ingest_reports_without_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://app.example.cl/dashboard/provider/9/acme";
    write_run(
        dir.path(),
        "2025-03-01T10:00:00Z",
        vec![
            product(url, Some(451), Some(3)),
            product(url, Some(452), None),
            product(url, None, None),
        ],
    );
    pipeline::run_consolidate(dir.path()).unwrap();

    let summary = ingest::run_ingest(&config(dir.path()), None, true)
        .await
        .unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.providers_inserted, 1);
    assert_eq!(summary.products_inserted, 2);
    assert_eq!(summary.skipped_missing_product_id, 1);
}

#[tokio::test]
async fn real_ingest_requires_database_url() {
    let dir = tempfile::tempdir().unwrap();
    let err = ingest::run_ingest(&config(dir.path()), None, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("DATABASE_URL"));
}

#[test]
fn failed_ingest_still_reports_partial_counts() {
    let partial = dropdb_db::IngestSummary {
        records: 1_400,
        products_inserted: 700,
        skipped_unresolved_provider: 4,
        batches: 1,
        ..dropdb_db::IngestSummary::default()
    };
    let failed: anyhow::Result<dropdb_db::IngestSummary> =
        Err(anyhow::Error::from(dropdb_db::IngestError {
            summary: partial,
            source: Box::new(dropdb_db::DbError::Unavailable("connection reset".into())),
        }));
    assert_eq!(ingest::reported_summary(&failed), Some(partial));

    let unrelated: anyhow::Result<dropdb_db::IngestSummary> =
        Err(anyhow::anyhow!("DATABASE_URL is not set"));
    assert_eq!(ingest::reported_summary(&unrelated), None);
}
