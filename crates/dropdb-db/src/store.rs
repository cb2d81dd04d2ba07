//! The persistence seam the upsert engine writes through.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::products::{self, ProductWrite};
use crate::providers::{self, NewProvider, ProviderPatch, ProviderRow};
use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Provider and product collections with bulk writes.
///
/// Implementations need not enforce uniqueness of `product_id`; when they
/// cannot, [`CatalogStore::upsert_products`] must fail with
/// [`DbError::ConflictTargetMissing`] so the caller can fall back to the
/// explicit insert/update methods.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<ProviderRow>, DbError>;

    async fn insert_providers(&self, providers: &[NewProvider])
        -> Result<Vec<ProviderRow>, DbError>;

    /// Fill-only update of existing providers. Returns the rows changed.
    async fn fill_providers(&self, patches: &[(i64, ProviderPatch)]) -> Result<usize, DbError>;

    async fn upsert_products(&self, batch: &[ProductWrite]) -> Result<WriteCounts, DbError>;

    async fn existing_product_ids(&self, product_ids: &[i64]) -> Result<HashSet<i64>, DbError>;

    async fn insert_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError>;

    async fn update_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError>;

    async fn prune_products_without_country(&self) -> Result<u64, DbError>;
}

/// Postgres-backed [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_providers(&self) -> Result<Vec<ProviderRow>, DbError> {
        providers::list_providers(&self.pool).await
    }

    async fn insert_providers(
        &self,
        providers: &[NewProvider],
    ) -> Result<Vec<ProviderRow>, DbError> {
        providers::insert_providers(&self.pool, providers).await
    }

    async fn fill_providers(&self, patches: &[(i64, ProviderPatch)]) -> Result<usize, DbError> {
        providers::fill_providers(&self.pool, patches).await
    }

    async fn upsert_products(&self, batch: &[ProductWrite]) -> Result<WriteCounts, DbError> {
        products::upsert_products(&self.pool, batch).await
    }

    async fn existing_product_ids(&self, product_ids: &[i64]) -> Result<HashSet<i64>, DbError> {
        products::existing_product_ids(&self.pool, product_ids).await
    }

    async fn insert_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError> {
        products::insert_products(&self.pool, batch).await
    }

    async fn update_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError> {
        products::update_products(&self.pool, batch).await
    }

    async fn prune_products_without_country(&self) -> Result<u64, DbError> {
        products::prune_products_without_country(&self.pool).await
    }
}
