//! Live integration tests for dropdb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/dropdb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory. Run with `cargo test -- --ignored` and
//! `DATABASE_URL` pointing at a server the harness can create databases on.

use dropdb_core::{ConsolidatedRecord, ScrapedProduct};
use dropdb_db::products::get_product;
use dropdb_db::{
    complete_ingest_run, create_ingest_run, fail_ingest_run, get_ingest_run, list_ingest_runs,
    start_ingest_run, CatalogStore, DbError, IngestSummary, PgStore, UpsertEngine,
    UpsertSettings,
};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record(provider: &str, product_id: i64, locale: Option<&str>) -> ConsolidatedRecord {
    ConsolidatedRecord {
        product: ScrapedProduct {
            provider_name: provider.to_string(),
            provider_id: Some(9),
            provider_url: format!(
                "https://app.example.cl/dashboard/provider/9/{}",
                provider.to_lowercase()
            ),
            product_id: Some(product_id),
            name: format!("Widget {product_id}"),
            category: "Hogar".to_string(),
            price_provider: Some("$ 12.990".to_string()),
            price_suggested: Some("$ 19.990".to_string()),
            stock: Some(product_id * 10),
            image: None,
            href: Some(format!(
                "https://app.example.cl/dashboard/product-details/{product_id}?ref=grid"
            )),
            locale: locale.map(str::to_string),
            card_provider_name: None,
            scraped_at: None,
        },
    }
}

fn settings() -> UpsertSettings {
    UpsertSettings {
        batch_size: 2,
        max_retries: 0,
        backoff_base_secs: 0,
    }
}

async fn count(pool: &sqlx::PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("count on {table} failed: {e}"))
}

// ---------------------------------------------------------------------------
// Section 1: Upsert engine
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reingest_is_idempotent(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let engine = UpsertEngine::new(&store, settings());
    let records: Vec<_> = (1..=3).map(|id| record("Acme", id, Some("chile"))).collect();

    let first = engine.ingest(&records).await.expect("first ingest failed");
    assert_eq!(first.providers_inserted, 1);
    assert_eq!(first.products_inserted, 3);
    assert_eq!(first.batches, 2);

    let second = engine.ingest(&records).await.expect("second ingest failed");
    assert_eq!(second.providers_inserted, 0);
    assert_eq!(second.products_inserted, 0);
    assert_eq!(second.products_updated, 3);
    assert_eq!(second.fallback_batches, 0);

    assert_eq!(count(&pool, "providers").await, 1);
    assert_eq!(count(&pool, "products").await, 3);

    let stored = get_product(&pool, 2).await.expect("get_product failed");
    assert_eq!(stored.stock, Some(20));
    assert_eq!(stored.price_provider, Some(Decimal::from(12_990)));
    assert_eq!(
        stored.href.as_deref(),
        Some("https://app.example.cl/dashboard/product-details/2")
    );
    assert_eq!(stored.country.as_deref(), Some("chile"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn null_fields_keep_stored_values(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let engine = UpsertEngine::new(&store, settings());
    engine
        .ingest(&[record("Acme", 1, Some("chile"))])
        .await
        .expect("first ingest failed");

    let mut sparse = record("Acme", 1, Some("chile"));
    sparse.product.stock = None;
    sparse.product.price_provider = None;
    engine.ingest(&[sparse]).await.expect("second ingest failed");

    let stored = get_product(&pool, 1).await.expect("get_product failed");
    assert_eq!(stored.stock, Some(10));
    assert_eq!(stored.price_provider, Some(Decimal::from(12_990)));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn missing_unique_constraint_uses_the_split_path(pool: sqlx::PgPool) {
    sqlx::query("ALTER TABLE products DROP CONSTRAINT products_product_id_key")
        .execute(&pool)
        .await
        .expect("drop constraint failed");

    let store = PgStore::new(pool.clone());
    let engine = UpsertEngine::new(&store, settings());
    let records: Vec<_> = (1..=3).map(|id| record("Acme", id, Some("chile"))).collect();

    let first = engine.ingest(&records).await.expect("first ingest failed");
    assert_eq!(first.fallback_batches, 2);
    assert_eq!(first.products_inserted, 3);

    let second = engine.ingest(&records).await.expect("second ingest failed");
    assert_eq!(second.products_inserted, 0);
    assert_eq!(second.products_updated, 3);
    assert_eq!(count(&pool, "products").await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn provider_fill_batches_only_touch_empty_columns(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let engine = UpsertEngine::new(&store, settings());
    let names = ["Acme", "Beta", "Gamma"];
    let bare: Vec<_> = names
        .iter()
        .zip(1..)
        .map(|(name, id)| record(name, id, None))
        .collect();
    engine.ingest(&bare).await.expect("first ingest failed");

    let located: Vec<_> = names
        .iter()
        .zip(1..)
        .map(|(name, id)| record(name, id, Some("chile")))
        .collect();
    let filled = engine.ingest(&located).await.expect("second ingest failed");
    assert_eq!(filled.providers_updated, 3);

    let moved: Vec<_> = names
        .iter()
        .zip(1..)
        .map(|(name, id)| record(name, id, Some("peru")))
        .collect();
    let kept = engine.ingest(&moved).await.expect("third ingest failed");
    assert_eq!(kept.providers_updated, 0);

    let countries: Vec<Option<String>> =
        sqlx::query_scalar("SELECT country FROM providers ORDER BY id")
            .fetch_all(&pool)
            .await
            .expect("select failed");
    assert_eq!(countries, vec![Some("chile".to_string()); 3]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn prune_deletes_rows_without_country(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    UpsertEngine::new(&store, settings())
        .ingest(&[record("Acme", 1, Some("chile")), record("Beta", 2, None)])
        .await
        .expect("ingest failed");

    let removed = store
        .prune_products_without_country()
        .await
        .expect("prune failed");
    assert_eq!(removed, 1);
    assert!(matches!(get_product(&pool, 2).await, Err(DbError::NotFound)));
    assert!(get_product(&pool, 1).await.is_ok());
}

// ---------------------------------------------------------------------------
// Section 2: Ingest run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn ingest_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_ingest_run(&pool, "cli", Some("out/master/master.json"))
        .await
        .expect("create_ingest_run failed");
    assert_eq!(run.status, "queued");
    assert!(run.started_at.is_none());

    start_ingest_run(&pool, run.id)
        .await
        .expect("start_ingest_run failed");

    let summary = IngestSummary {
        records: 12,
        providers_inserted: 2,
        products_inserted: 9,
        skipped_missing_product_id: 3,
        ..IngestSummary::default()
    };
    complete_ingest_run(&pool, run.id, &summary)
        .await
        .expect("complete_ingest_run failed");

    let fetched = get_ingest_run(&pool, run.id)
        .await
        .expect("get_ingest_run failed");
    assert_eq!(fetched.status, "succeeded");
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_some());
    assert_eq!(fetched.records_processed, 12);
    assert_eq!(fetched.providers_inserted, 2);
    assert_eq!(fetched.products_inserted, 9);
    assert_eq!(fetched.skipped_missing_product_id, 3);
    assert_eq!(
        fetched.source_path.as_deref(),
        Some("out/master/master.json")
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn ingest_run_lifecycle_queued_to_failed(pool: sqlx::PgPool) {
    let run = create_ingest_run(&pool, "cli", None)
        .await
        .expect("create_ingest_run failed");
    start_ingest_run(&pool, run.id)
        .await
        .expect("start_ingest_run failed");
    let partial = IngestSummary {
        records: 1_400,
        providers_inserted: 3,
        products_inserted: 700,
        skipped_unresolved_provider: 2,
        ..IngestSummary::default()
    };
    fail_ingest_run(&pool, run.id, "connection reset", &partial)
        .await
        .expect("fail_ingest_run failed");

    let fetched = get_ingest_run(&pool, run.id)
        .await
        .expect("get_ingest_run failed");
    assert_eq!(fetched.status, "failed");
    assert_eq!(fetched.error_message.as_deref(), Some("connection reset"));
    assert_eq!(fetched.records_processed, 1_400);
    assert_eq!(fetched.products_inserted, 700);
    assert_eq!(fetched.skipped_unresolved_provider, 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn ingest_run_rejects_invalid_transitions(pool: sqlx::PgPool) {
    let run = create_ingest_run(&pool, "cli", None)
        .await
        .expect("create_ingest_run failed");

    let err = complete_ingest_run(&pool, run.id, &IngestSummary::default())
        .await
        .expect_err("completing a queued run must fail");
    assert!(matches!(
        err,
        DbError::InvalidIngestRunTransition {
            expected_status: "running",
            ..
        }
    ));

    start_ingest_run(&pool, run.id)
        .await
        .expect("start_ingest_run failed");
    let err = start_ingest_run(&pool, run.id)
        .await
        .expect_err("starting twice must fail");
    assert!(matches!(
        err,
        DbError::InvalidIngestRunTransition {
            expected_status: "queued",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_ingest_runs_returns_newest_first(pool: sqlx::PgPool) {
    let older = create_ingest_run(&pool, "cli", None)
        .await
        .expect("create_ingest_run failed");
    let newer = create_ingest_run(&pool, "cli", None)
        .await
        .expect("create_ingest_run failed");

    let runs = list_ingest_runs(&pool, 10)
        .await
        .expect("list_ingest_runs failed");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, newer.id);
    assert_eq!(runs[1].id, older.id);

    assert!(matches!(
        get_ingest_run(&pool, 9_999).await,
        Err(DbError::NotFound)
    ));
}
