//! Ingest command: persists a master dataset through the upsert engine.

use std::path::Path;

use dropdb_core::AppConfig;
use dropdb_db::{
    IngestError, IngestSummary, MemoryStore, PgStore, PoolConfig, UpsertEngine, UpsertSettings,
};
use dropdb_master::{latest_master, read_master, MasterDataset};

/// Loads `master` (or the newest master under the output directory) and
/// ingests it.
///
/// # Errors
///
/// Returns an error if `DATABASE_URL` is missing for a real ingest, the
/// master cannot be read, or a batch keeps failing.
pub(crate) async fn run_ingest(
    config: &AppConfig,
    master: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<IngestSummary> {
    if !dry_run {
        config.require_database_url()?;
    }
    let path = match master {
        Some(path) => path.to_path_buf(),
        None => latest_master(&config.out_dir)?,
    };
    let dataset = read_master(&path)?;
    tracing::info!(
        master = %path.display(),
        records = dataset.products.len(),
        dry_run,
        "ingesting master dataset"
    );
    ingest_dataset(config, &dataset, Some(&path), dry_run).await
}

/// Ingests an in-memory dataset.
///
/// A dry run resolves identities and batches against an empty in-process
/// store, so it reports skips and collapses without connecting anywhere.
///
/// # Errors
///
/// Returns an error if the pool cannot be established or a batch keeps
/// failing. Ingest-run bookkeeping failures are logged only.
pub(crate) async fn ingest_dataset(
    config: &AppConfig,
    dataset: &MasterDataset,
    source: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<IngestSummary> {
    let settings = UpsertSettings::from_app_config(config);

    if dry_run {
        let store = MemoryStore::new();
        let summary = UpsertEngine::new(&store, settings)
            .ingest(&dataset.products)
            .await?;
        return Ok(summary);
    }

    let database_url = config.require_database_url()?;
    let pool = dropdb_db::connect_pool(database_url, PoolConfig::from_app_config(config)).await?;
    let source_path = source.map(|p| p.display().to_string());
    let run_id = begin_run_best_effort(&pool, source_path.as_deref()).await;

    let store = PgStore::new(pool.clone());
    let result = UpsertEngine::new(&store, settings)
        .ingest(&dataset.products)
        .await;

    if let Some(run_id) = run_id {
        match &result {
            Ok(summary) => {
                if let Err(err) = dropdb_db::complete_ingest_run(&pool, run_id, summary).await {
                    tracing::error!(run_id, error = %err, "failed to mark ingest run as succeeded");
                }
            }
            Err(err) => {
                let message = format!("{err}: {}", err.source);
                fail_run_best_effort(&pool, run_id, &message, &err.summary).await;
            }
        }
    }

    result.map_err(anyhow::Error::from)
}

/// The counts to report for an ingest outcome. A failed ingest still
/// reports what it wrote and skipped before stopping.
pub(crate) fn reported_summary(result: &anyhow::Result<IngestSummary>) -> Option<IngestSummary> {
    match result {
        Ok(summary) => Some(*summary),
        Err(err) => err.downcast_ref::<IngestError>().map(|e| e.summary),
    }
}

/// Creates and starts an ingest run, returning its id if both succeeded.
async fn begin_run_best_effort(pool: &sqlx::PgPool, source_path: Option<&str>) -> Option<i64> {
    let run = match dropdb_db::create_ingest_run(pool, "cli", source_path).await {
        Ok(run) => run,
        Err(err) => {
            tracing::warn!(error = %err, "could not record ingest run; continuing");
            return None;
        }
    };
    if let Err(err) = dropdb_db::start_ingest_run(pool, run.id).await {
        tracing::warn!(run_id = run.id, error = %err, "could not start ingest run; continuing");
        return None;
    }
    Some(run.id)
}

/// Attempt to mark an ingest run as failed, logging any secondary error.
async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    message: &str,
    partial: &IngestSummary,
) {
    if let Err(mark_err) = dropdb_db::fail_ingest_run(pool, run_id, message, partial).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark ingest run as failed"
        );
    }
}
