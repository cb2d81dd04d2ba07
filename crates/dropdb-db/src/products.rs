//! Database operations for `products`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::store::WriteCounts;
use crate::DbError;

const TABLE: &str = "products";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub product_id: i64,
    pub provider_id: i64,
    pub name: String,
    pub category: String,
    pub stock: Option<i64>,
    pub image_url: Option<String>,
    pub price_provider: Option<Decimal>,
    pub price_suggested: Option<Decimal>,
    pub href: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product as written by the upsert engine. `provider_id` is the
/// internal `providers.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductWrite {
    pub product_id: i64,
    pub provider_id: i64,
    pub name: String,
    pub category: String,
    pub stock: Option<i64>,
    pub image_url: Option<String>,
    pub price_provider: Option<Decimal>,
    pub price_suggested: Option<Decimal>,
    pub href: Option<String>,
    pub country: Option<String>,
}

// Nullable columns keep their stored value when the incoming one is NULL.
const UPDATE_ASSIGNMENTS: &str = "\
    provider_id     = EXCLUDED.provider_id, \
    name            = EXCLUDED.name, \
    category        = EXCLUDED.category, \
    stock           = COALESCE(EXCLUDED.stock, products.stock), \
    image_url       = COALESCE(EXCLUDED.image_url, products.image_url), \
    price_provider  = COALESCE(EXCLUDED.price_provider, products.price_provider), \
    price_suggested = COALESCE(EXCLUDED.price_suggested, products.price_suggested), \
    href            = COALESCE(EXCLUDED.href, products.href), \
    country         = COALESCE(EXCLUDED.country, products.country), \
    updated_at      = NOW()";

fn push_product_values<'a>(qb: &mut QueryBuilder<'a, Postgres>, batch: &'a [ProductWrite]) {
    qb.push(
        "INSERT INTO products (product_id, provider_id, name, category, stock, image_url, \
         price_provider, price_suggested, href, country) ",
    );
    qb.push_values(batch, |mut b, p| {
        b.push_bind(p.product_id)
            .push_bind(p.provider_id)
            .push_bind(&p.name)
            .push_bind(&p.category)
            .push_bind(p.stock)
            .push_bind(&p.image_url)
            .push_bind(p.price_provider)
            .push_bind(p.price_suggested)
            .push_bind(&p.href)
            .push_bind(&p.country);
    });
}

// ---------------------------------------------------------------------------
// products operations
// ---------------------------------------------------------------------------

/// Bulk insert-or-update keyed on `product_id` in one statement.
///
/// # Errors
///
/// Returns [`DbError::ConflictTargetMissing`] when `products.product_id`
/// carries no unique constraint, or [`DbError::Sqlx`] for other failures.
pub async fn upsert_products(pool: &PgPool, batch: &[ProductWrite]) -> Result<WriteCounts, DbError> {
    if batch.is_empty() {
        return Ok(WriteCounts::default());
    }
    let mut qb = QueryBuilder::new("");
    push_product_values(&mut qb, batch);
    qb.push(" ON CONFLICT (product_id) DO UPDATE SET ");
    qb.push(UPDATE_ASSIGNMENTS);
    // xmax is zero only for freshly inserted tuples.
    qb.push(" RETURNING (xmax = 0) AS inserted");

    let flags: Vec<bool> = qb
        .build_query_scalar::<bool>()
        .fetch_all(pool)
        .await
        .map_err(|e| DbError::from_write(TABLE, e))?;
    let inserted = flags.iter().filter(|f| **f).count();
    Ok(WriteCounts {
        inserted,
        updated: flags.len() - inserted,
    })
}

/// Which of `product_ids` already have a row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn existing_product_ids(
    pool: &PgPool,
    product_ids: &[i64],
) -> Result<HashSet<i64>, DbError> {
    if product_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT product_id FROM products WHERE product_id = ANY($1)",
    )
    .bind(product_ids)
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().collect())
}

/// Plain multi-row insert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_products(pool: &PgPool, batch: &[ProductWrite]) -> Result<usize, DbError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::new("");
    push_product_values(&mut qb, batch);
    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(|e| DbError::from_write(TABLE, e))?;
    Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
}

/// Updates existing rows matched by `product_id`, using the same field rules
/// as [`upsert_products`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_products(pool: &PgPool, batch: &[ProductWrite]) -> Result<usize, DbError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "UPDATE products SET \
             provider_id     = v.provider_id, \
             name            = v.name, \
             category        = v.category, \
             stock           = COALESCE(v.stock, products.stock), \
             image_url       = COALESCE(v.image_url, products.image_url), \
             price_provider  = COALESCE(v.price_provider, products.price_provider), \
             price_suggested = COALESCE(v.price_suggested, products.price_suggested), \
             href            = COALESCE(v.href, products.href), \
             country         = COALESCE(v.country, products.country), \
             updated_at      = NOW() \
         FROM (",
    );
    qb.push_values(batch, |mut b, p| {
        b.push_bind(p.product_id)
            .push_unseparated("::bigint")
            .push_bind(p.provider_id)
            .push_unseparated("::bigint")
            .push_bind(&p.name)
            .push_unseparated("::text")
            .push_bind(&p.category)
            .push_unseparated("::text")
            .push_bind(p.stock)
            .push_unseparated("::bigint")
            .push_bind(&p.image_url)
            .push_unseparated("::text")
            .push_bind(p.price_provider)
            .push_unseparated("::numeric")
            .push_bind(p.price_suggested)
            .push_unseparated("::numeric")
            .push_bind(&p.href)
            .push_unseparated("::text")
            .push_bind(&p.country)
            .push_unseparated("::text");
    });
    qb.push(
        ") AS v (product_id, provider_id, name, category, stock, image_url, \
                 price_provider, price_suggested, href, country) \
         WHERE products.product_id = v.product_id",
    );
    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(|e| DbError::from_write(TABLE, e))?;
    Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
}

/// Deletes products with no country. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn prune_products_without_country(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM products WHERE country IS NULL")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Fetches one product by its storefront `product_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if absent, or [`DbError::Sqlx`] if the
/// query fails.
pub async fn get_product(pool: &PgPool, product_id: i64) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(
        "SELECT id, product_id, provider_id, name, category, stock, image_url, \
                price_provider, price_suggested, href, country, created_at, updated_at \
         FROM products \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
