//! In-process [`CatalogStore`] with switchable uniqueness enforcement.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::products::ProductWrite;
use crate::providers::{NewProvider, ProviderPatch, ProviderRow};
use crate::store::{CatalogStore, WriteCounts};
use crate::DbError;

#[derive(Debug, Default)]
struct State {
    providers: Vec<ProviderRow>,
    products: Vec<ProductWrite>,
    next_provider_id: i64,
}

/// Calls received, for asserting on the write path taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub provider_inserts: u32,
    pub provider_fills: u32,
    pub upserts: u32,
    pub existence_checks: u32,
    pub inserts: u32,
    pub updates: u32,
}

#[derive(Debug)]
pub struct MemoryStore {
    enforce_product_unique: bool,
    state: Mutex<State>,
    calls: Mutex<StoreCalls>,
    transient_failures: AtomicU32,
    lost_acks: AtomicU32,
}

impl MemoryStore {
    /// A store that supports `ON CONFLICT (product_id)`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_uniqueness(true)
    }

    /// `enforce_product_unique = false` models a backing store without the
    /// unique constraint: bulk upserts are rejected and plain inserts never
    /// check for duplicates.
    #[must_use]
    pub fn with_uniqueness(enforce_product_unique: bool) -> Self {
        Self {
            enforce_product_unique,
            state: Mutex::new(State {
                next_provider_id: 1,
                ..State::default()
            }),
            calls: Mutex::new(StoreCalls::default()),
            transient_failures: AtomicU32::new(0),
            lost_acks: AtomicU32::new(0),
        }
    }

    /// The next `n` product writes fail with [`DbError::Unavailable`].
    pub fn fail_next_writes(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` inserts and updates commit, then report
    /// [`DbError::Unavailable`] as if the connection dropped before the
    /// acknowledgement arrived.
    pub fn lose_next_acks(&self, n: u32) {
        self.lost_acks.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn providers(&self) -> Vec<ProviderRow> {
        self.state
            .lock()
            .map(|s| s.providers.clone())
            .unwrap_or_default()
    }

    /// Every stored product row, duplicates included.
    #[must_use]
    pub fn products(&self) -> Vec<ProductWrite> {
        self.state
            .lock()
            .map(|s| s.products.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn calls(&self) -> StoreCalls {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, DbError> {
        self.state
            .lock()
            .map_err(|_| DbError::Unavailable("memory store lock poisoned".into()))
    }

    fn record(&self, f: impl FnOnce(&mut StoreCalls)) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }

    fn take_transient_failure(&self) -> Result<(), DbError> {
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(DbError::Unavailable("injected transient failure".into()));
        }
        Ok(())
    }

    fn acknowledge<T>(&self, value: T) -> Result<T, DbError> {
        let lost = self
            .lost_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(DbError::Unavailable("connection dropped after commit".into()));
        }
        Ok(value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_into(target: &mut ProductWrite, incoming: &ProductWrite) {
    target.provider_id = incoming.provider_id;
    target.name.clone_from(&incoming.name);
    target.category.clone_from(&incoming.category);
    if incoming.stock.is_some() {
        target.stock = incoming.stock;
    }
    if incoming.image_url.is_some() {
        target.image_url.clone_from(&incoming.image_url);
    }
    if incoming.price_provider.is_some() {
        target.price_provider = incoming.price_provider;
    }
    if incoming.price_suggested.is_some() {
        target.price_suggested = incoming.price_suggested;
    }
    if incoming.href.is_some() {
        target.href.clone_from(&incoming.href);
    }
    if incoming.country.is_some() {
        target.country.clone_from(&incoming.country);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_providers(&self) -> Result<Vec<ProviderRow>, DbError> {
        Ok(self.state()?.providers.clone())
    }

    async fn insert_providers(
        &self,
        providers: &[NewProvider],
    ) -> Result<Vec<ProviderRow>, DbError> {
        self.record(|c| c.provider_inserts += 1);
        let mut state = self.state()?;
        let mut created = Vec::with_capacity(providers.len());
        for p in providers {
            let row = ProviderRow {
                id: state.next_provider_id,
                name: p.name.clone(),
                country: p.country.clone(),
                source_url: p.source_url.clone(),
                source_provider_id: p.source_provider_id,
            };
            state.next_provider_id += 1;
            state.providers.push(row.clone());
            created.push(row);
        }
        drop(state);
        // Mirror Postgres, which does not promise RETURNING order.
        created.reverse();
        self.acknowledge(created)
    }

    async fn fill_providers(&self, patches: &[(i64, ProviderPatch)]) -> Result<usize, DbError> {
        self.record(|c| c.provider_fills += 1);
        let mut state = self.state()?;
        let mut changed = 0;
        for (id, patch) in patches {
            let Some(row) = state.providers.iter_mut().find(|r| r.id == *id) else {
                continue;
            };
            if patch.against(row).is_some() {
                patch.apply(row);
                changed += 1;
            }
        }
        drop(state);
        self.acknowledge(changed)
    }

    async fn upsert_products(&self, batch: &[ProductWrite]) -> Result<WriteCounts, DbError> {
        self.record(|c| c.upserts += 1);
        if !self.enforce_product_unique {
            return Err(DbError::ConflictTargetMissing { table: "products" });
        }
        self.take_transient_failure()?;
        let mut state = self.state()?;
        let mut counts = WriteCounts::default();
        for incoming in batch {
            match state
                .products
                .iter_mut()
                .find(|p| p.product_id == incoming.product_id)
            {
                Some(existing) => {
                    merge_into(existing, incoming);
                    counts.updated += 1;
                }
                None => {
                    state.products.push(incoming.clone());
                    counts.inserted += 1;
                }
            }
        }
        drop(state);
        self.acknowledge(counts)
    }

    async fn existing_product_ids(&self, product_ids: &[i64]) -> Result<HashSet<i64>, DbError> {
        self.record(|c| c.existence_checks += 1);
        let wanted: HashSet<i64> = product_ids.iter().copied().collect();
        Ok(self
            .state()?
            .products
            .iter()
            .map(|p| p.product_id)
            .filter(|id| wanted.contains(id))
            .collect())
    }

    async fn insert_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError> {
        self.record(|c| c.inserts += 1);
        self.take_transient_failure()?;
        let mut state = self.state()?;
        state.products.extend(batch.iter().cloned());
        drop(state);
        self.acknowledge(batch.len())
    }

    async fn update_products(&self, batch: &[ProductWrite]) -> Result<usize, DbError> {
        self.record(|c| c.updates += 1);
        self.take_transient_failure()?;
        let mut state = self.state()?;
        let mut touched = 0;
        for incoming in batch {
            for existing in state
                .products
                .iter_mut()
                .filter(|p| p.product_id == incoming.product_id)
            {
                merge_into(existing, incoming);
                touched += 1;
            }
        }
        drop(state);
        self.acknowledge(touched)
    }

    async fn prune_products_without_country(&self) -> Result<u64, DbError> {
        let mut state = self.state()?;
        let before = state.products.len();
        state.products.retain(|p| p.country.is_some());
        Ok(u64::try_from(before - state.products.len()).unwrap_or(u64::MAX))
    }
}
