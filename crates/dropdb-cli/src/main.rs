mod ingest;
mod pipeline;
mod summary;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dropdb_core::AppConfig;
use dropdb_db::CatalogStore;

use crate::pipeline::ScrapeArgs;
use crate::summary::InvocationSummary;

#[derive(Debug, Parser)]
#[command(name = "dropdb-cli")]
#[command(about = "Scrapes provider catalogs and loads them into the product database")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape every provider page and write one run per provider
    Scrape {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },
    /// Merge all provider runs into a new master dataset
    Consolidate,
    /// Persist a master dataset into the database
    Ingest {
        /// Master JSON to ingest; defaults to the newest under the output directory
        #[arg(long)]
        master: Option<PathBuf>,

        /// Resolve identities and report counts without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Scrape, consolidate and optionally ingest in one invocation
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,

        /// Ingest the new master dataset once written
        #[arg(long)]
        ingest: bool,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Delete products that carry no country
    PruneNoCountry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = dropdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Scrape { scrape }) => run_scrape_command(&config, &scrape).await,
        Some(Commands::Consolidate) => {
            let mut summary = InvocationSummary::default();
            let result = pipeline::run_consolidate(&config.out_dir);
            if let Ok((totals, _)) = &result {
                summary.consolidate = Some(totals.clone());
            }
            summary.print();
            result.map(|_| ())
        }
        Some(Commands::Ingest { master, dry_run }) => {
            let result = ingest::run_ingest(&config, master.as_deref(), dry_run).await;
            if let Some(summary) = ingest::reported_summary(&result) {
                InvocationSummary {
                    ingest: Some(summary),
                    dry_run,
                    ..InvocationSummary::default()
                }
                .print();
            }
            result.map(|_| ())
        }
        Some(Commands::Run { scrape, ingest }) => run_pipeline(&config, &scrape, ingest).await,
        Some(Commands::Db { command }) => run_db_command(&config, command).await,
        None => {
            println!("dropdb-cli ready; run with --help to list commands");
            Ok(())
        }
    }
}

async fn run_scrape_command(config: &AppConfig, args: &ScrapeArgs) -> anyhow::Result<()> {
    let totals = pipeline::run_scrape(config, args).await?;
    let all_failed = totals.all_failed();
    let providers = totals.providers;
    InvocationSummary {
        scrape: Some(totals),
        ..InvocationSummary::default()
    }
    .print();
    if all_failed {
        anyhow::bail!("all {providers} provider runs failed");
    }
    Ok(())
}

async fn run_pipeline(config: &AppConfig, args: &ScrapeArgs, ingest: bool) -> anyhow::Result<()> {
    if ingest {
        config.require_database_url()?;
    }

    let mut summary = InvocationSummary::default();
    let totals = pipeline::run_scrape(config, args).await?;
    let all_failed = totals.all_failed();
    let providers = totals.providers;
    summary.scrape = Some(totals);
    if all_failed {
        summary.print();
        anyhow::bail!("all {providers} provider runs failed");
    }

    let (consolidated, dataset) = match pipeline::run_consolidate(&config.out_dir) {
        Ok(done) => done,
        Err(err) => {
            summary.print();
            return Err(err);
        }
    };
    let master_json = consolidated.master_json.clone();
    summary.consolidate = Some(consolidated);

    if ingest {
        let result = ingest::ingest_dataset(config, &dataset, master_json.as_deref(), false).await;
        summary.ingest = ingest::reported_summary(&result);
        if let Err(err) = result {
            summary.print();
            return Err(err);
        }
    }

    summary.print();
    Ok(())
}

async fn run_db_command(config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let database_url = config.require_database_url()?;
    let pool_config = dropdb_db::PoolConfig::from_app_config(config);
    let pool = dropdb_db::connect_pool(database_url, pool_config).await?;

    match command {
        DbCommands::Ping => {
            dropdb_db::ping(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = dropdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        DbCommands::PruneNoCountry => {
            let store = dropdb_db::PgStore::new(pool);
            let deleted = store.prune_products_without_country().await?;
            tracing::info!(deleted, "pruned products without country");
            println!("deleted {deleted} products without country");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
