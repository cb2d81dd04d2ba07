//! Bulk persistence of consolidated records: providers first, then products.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use dropdb_core::urls::canonical_url;
use dropdb_core::{parse_price, supersedes, AppConfig, ConsolidatedRecord, ScrapedProduct};

use crate::identity::{ProviderClaim, ProviderIndex, Resolution};
use crate::products::ProductWrite;
use crate::providers::{ProviderPatch, ProviderRow};
use crate::retry::{retry_attempts, retry_with_backoff};
use crate::store::{CatalogStore, WriteCounts};
use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSettings {
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl Default for UpsertSettings {
    fn default() -> Self {
        Self {
            batch_size: 700,
            max_retries: 3,
            backoff_base_secs: 2,
        }
    }
}

impl UpsertSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.upsert_batch_size,
            max_retries: config.store_max_retries,
            backoff_base_secs: config.store_backoff_base_secs,
        }
    }
}

/// Counts reported at the end of every ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub records: usize,
    pub providers_inserted: usize,
    pub providers_updated: usize,
    pub products_inserted: usize,
    pub products_updated: usize,
    pub skipped_unresolved_provider: usize,
    pub skipped_missing_product_id: usize,
    /// Records folded into another record with the same product id.
    pub collapsed_duplicates: usize,
    pub batches: usize,
    /// Batches written through the insert/update split.
    pub fallback_batches: usize,
}

/// An ingest that stopped on a batch that kept failing.
///
/// Batches written before the failure stay written; `summary` counts them
/// along with every record skipped up to that point.
#[derive(Debug, Error)]
#[error("ingest aborted; earlier batches stay written")]
pub struct IngestError {
    pub summary: IngestSummary,
    #[source]
    pub source: Box<DbError>,
}

#[derive(Debug, Clone, Copy)]
enum ProviderRef {
    Stored(i64),
    Pending(usize),
}

/// Ids for one chunk of pending providers, in chunk order.
struct ChunkIds {
    ids: Vec<Option<i64>>,
    inserted: usize,
}

/// Writes consolidated records through a [`CatalogStore`].
pub struct UpsertEngine<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    settings: UpsertSettings,
}

impl<'a, S: CatalogStore + ?Sized> UpsertEngine<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, settings: UpsertSettings) -> Self {
        Self {
            store,
            settings: UpsertSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
        }
    }

    /// Persists `records`. Re-running with the same input creates no new
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when a batch keeps failing after retries. It
    /// carries the counts accumulated before the failure.
    pub async fn ingest(
        &self,
        records: &[ConsolidatedRecord],
    ) -> Result<IngestSummary, IngestError> {
        let mut summary = IngestSummary {
            records: records.len(),
            ..IngestSummary::default()
        };

        if let Err(source) = self.write_all(records, &mut summary).await {
            tracing::error!(
                error = %source,
                batches_written = summary.batches,
                products_inserted = summary.products_inserted,
                products_updated = summary.products_updated,
                "ingest aborted"
            );
            return Err(IngestError {
                summary,
                source: Box::new(source),
            });
        }

        tracing::info!(
            records = summary.records,
            providers_inserted = summary.providers_inserted,
            providers_updated = summary.providers_updated,
            products_inserted = summary.products_inserted,
            products_updated = summary.products_updated,
            skipped_unresolved_provider = summary.skipped_unresolved_provider,
            skipped_missing_product_id = summary.skipped_missing_product_id,
            fallback_batches = summary.fallback_batches,
            "ingest complete"
        );
        Ok(summary)
    }

    async fn write_all(
        &self,
        records: &[ConsolidatedRecord],
        summary: &mut IngestSummary,
    ) -> Result<(), DbError> {
        let provider_ids = self.persist_providers(records, summary).await?;
        let writes = collapse_products(records, &provider_ids, summary);
        self.persist_products(&writes, summary).await
    }

    /// Resolves every record's provider, inserting new providers and filling
    /// empty columns of existing ones. Returns the provider id per record.
    async fn persist_providers(
        &self,
        records: &[ConsolidatedRecord],
        summary: &mut IngestSummary,
    ) -> Result<Vec<Option<i64>>, DbError> {
        let s = self.settings;
        let rows = retry_with_backoff(s.max_retries, s.backoff_base_secs, || {
            self.store.list_providers()
        })
        .await?;
        let stored_rows: HashMap<i64, &ProviderRow> = rows.iter().map(|r| (r.id, r)).collect();
        let mut stored = ProviderIndex::from_rows(&rows);
        let mut pending: ProviderIndex<usize> = ProviderIndex::default();
        let mut pending_claims: Vec<ProviderClaim> = Vec::new();
        let mut patches: HashMap<i64, ProviderClaim> = HashMap::new();

        let mut refs: Vec<Option<ProviderRef>> = Vec::with_capacity(records.len());
        for record in records {
            let claim = ProviderClaim::from_record(&record.product);
            let resolved = match stored.resolve(&claim) {
                Resolution::Found(id) => {
                    patches
                        .entry(id)
                        .and_modify(|p| p.absorb(&claim))
                        .or_insert_with(|| claim.clone());
                    stored.register(id, &claim);
                    Some(ProviderRef::Stored(id))
                }
                Resolution::New => {
                    let slot = pending.lookup(&claim).unwrap_or_else(|| {
                        pending_claims.push(claim.clone());
                        pending_claims.len() - 1
                    });
                    pending_claims[slot].absorb(&claim);
                    pending.register(slot, &claim);
                    Some(ProviderRef::Pending(slot))
                }
                Resolution::Unresolved => {
                    summary.skipped_unresolved_provider += 1;
                    tracing::warn!(
                        product = %record.product.name,
                        provider_name = %record.product.provider_name,
                        "provider identity unresolved; record skipped"
                    );
                    None
                }
            };
            refs.push(resolved);
        }

        let slot_ids = self.insert_pending(&pending_claims, summary).await?;

        let mut patch_ids: Vec<i64> = patches.keys().copied().collect();
        patch_ids.sort_unstable();
        let fills: Vec<(i64, ProviderPatch)> = patch_ids
            .into_iter()
            .filter_map(|id| {
                let row = stored_rows.get(&id)?;
                patches[&id].to_patch().against(row).map(|patch| (id, patch))
            })
            .collect();
        for chunk in fills.chunks(s.batch_size) {
            let changed = retry_with_backoff(s.max_retries, s.backoff_base_secs, || {
                self.store.fill_providers(chunk)
            })
            .await?;
            tracing::debug!(size = chunk.len(), changed, "provider fill batch written");
            summary.providers_updated += chunk.len();
        }

        Ok(refs
            .into_iter()
            .map(|r| match r? {
                ProviderRef::Stored(id) => Some(id),
                ProviderRef::Pending(slot) => slot_ids.get(slot).copied().flatten(),
            })
            .collect())
    }

    /// Inserts pending providers in batches and maps each slot to its new id.
    async fn insert_pending(
        &self,
        claims: &[ProviderClaim],
        summary: &mut IngestSummary,
    ) -> Result<Vec<Option<i64>>, DbError> {
        let s = self.settings;
        let mut slot_ids: Vec<Option<i64>> = Vec::with_capacity(claims.len());
        for chunk in claims.chunks(s.batch_size) {
            let written = retry_attempts(s.max_retries, s.backoff_base_secs, |attempt| {
                self.insert_provider_chunk(chunk, attempt > 0)
            })
            .await?;
            slot_ids.extend(written.ids);
            summary.providers_inserted += written.inserted;
        }
        Ok(slot_ids)
    }

    /// Inserts one chunk of new providers. With `reconcile`, providers a
    /// failed attempt already committed are looked up instead of inserted
    /// a second time.
    async fn insert_provider_chunk(
        &self,
        chunk: &[ProviderClaim],
        reconcile: bool,
    ) -> Result<ChunkIds, DbError> {
        let mut ids: Vec<Option<i64>> = vec![None; chunk.len()];
        let mut recovered = 0;
        if reconcile {
            let rows = self.store.list_providers().await?;
            let index = ProviderIndex::from_rows(&rows);
            for (id, claim) in ids.iter_mut().zip(chunk) {
                if let Resolution::Found(found) = index.resolve(claim) {
                    *id = Some(found);
                    recovered += 1;
                }
            }
            if recovered > 0 {
                tracing::info!(recovered, "providers from an unacknowledged insert found");
            }
        }

        let missing: Vec<usize> = (0..chunk.len()).filter(|&i| ids[i].is_none()).collect();
        if missing.is_empty() {
            return Ok(ChunkIds {
                ids,
                inserted: recovered,
            });
        }
        let new_rows: Vec<_> = missing
            .iter()
            .map(|&i| chunk[i].to_new_provider())
            .collect();
        let created = self.store.insert_providers(&new_rows).await?;

        let mut batch_index: ProviderIndex<usize> = ProviderIndex::default();
        for &i in &missing {
            batch_index.register(i, &chunk[i]);
        }
        for row in &created {
            match batch_index.lookup(&ProviderClaim::from_row(row)) {
                Some(i) => ids[i] = Some(row.id),
                None => tracing::error!(
                    provider_id = row.id,
                    name = %row.name,
                    "inserted provider not matched to its records"
                ),
            }
        }
        Ok(ChunkIds {
            ids,
            inserted: created.len() + recovered,
        })
    }

    async fn persist_products(
        &self,
        writes: &[ProductWrite],
        summary: &mut IngestSummary,
    ) -> Result<(), DbError> {
        let s = self.settings;
        for (batch_no, batch) in writes.chunks(s.batch_size).enumerate() {
            let bulk = retry_with_backoff(s.max_retries, s.backoff_base_secs, || {
                self.store.upsert_products(batch)
            })
            .await;
            let counts = match bulk {
                Ok(counts) => counts,
                Err(DbError::ConflictTargetMissing { table }) => {
                    tracing::warn!(
                        batch = batch_no,
                        table,
                        "bulk upsert rejected; splitting into inserts and updates"
                    );
                    summary.fallback_batches += 1;
                    self.split_write(batch).await?
                }
                Err(err) => return Err(err),
            };
            summary.batches += 1;
            summary.products_inserted += counts.inserted;
            summary.products_updated += counts.updated;
            tracing::debug!(
                batch = batch_no,
                size = batch.len(),
                inserted = counts.inserted,
                updated = counts.updated,
                "product batch written"
            );
        }
        Ok(())
    }

    /// Writes `batch` as an existence check followed by inserts and
    /// updates. A retry re-checks existence first, so rows a failed attempt
    /// committed are updated rather than inserted again.
    async fn split_write(&self, batch: &[ProductWrite]) -> Result<WriteCounts, DbError> {
        let s = self.settings;
        let ids: Vec<i64> = batch.iter().map(|p| p.product_id).collect();
        let ids = ids.as_slice();
        let before: HashSet<i64> = retry_with_backoff(s.max_retries, s.backoff_base_secs, || {
            self.store.existing_product_ids(ids)
        })
        .await?;
        let before_ref = &before;

        retry_attempts(s.max_retries, s.backoff_base_secs, move |attempt| async move {
            if attempt == 0 {
                return self.write_partition(batch, before_ref).await;
            }
            let existing = self.store.existing_product_ids(ids).await?;
            self.write_partition(batch, &existing).await
        })
        .await?;

        let updated = batch
            .iter()
            .filter(|p| before.contains(&p.product_id))
            .count();
        Ok(WriteCounts {
            inserted: batch.len() - updated,
            updated,
        })
    }

    async fn write_partition(
        &self,
        batch: &[ProductWrite],
        existing: &HashSet<i64>,
    ) -> Result<(), DbError> {
        let (updates, inserts): (Vec<ProductWrite>, Vec<ProductWrite>) = batch
            .iter()
            .cloned()
            .partition(|p| existing.contains(&p.product_id));
        if !inserts.is_empty() {
            self.store.insert_products(&inserts).await?;
        }
        if !updates.is_empty() {
            self.store.update_products(&updates).await?;
        }
        Ok(())
    }
}

/// Builds one write per product id, choosing among duplicates with the
/// consolidator's completeness rule.
fn collapse_products(
    records: &[ConsolidatedRecord],
    provider_ids: &[Option<i64>],
    summary: &mut IngestSummary,
) -> Vec<ProductWrite> {
    let mut chosen: Vec<(&ScrapedProduct, i64)> = Vec::new();
    let mut by_id: HashMap<i64, usize> = HashMap::new();

    for (record, provider_id) in records.iter().zip(provider_ids) {
        let Some(provider_id) = *provider_id else {
            continue;
        };
        let product = &record.product;
        let Some(product_id) = product.product_id else {
            summary.skipped_missing_product_id += 1;
            continue;
        };
        match by_id.get(&product_id) {
            Some(&pos) => {
                summary.collapsed_duplicates += 1;
                if supersedes(product, chosen[pos].0) {
                    chosen[pos] = (product, provider_id);
                }
            }
            None => {
                by_id.insert(product_id, chosen.len());
                chosen.push((product, provider_id));
            }
        }
    }

    chosen
        .into_iter()
        .filter_map(|(p, provider_id)| {
            Some(ProductWrite {
                product_id: p.product_id?,
                provider_id,
                name: p.name.clone(),
                category: p.category.clone(),
                stock: p.stock,
                image_url: p.image.clone(),
                price_provider: p.price_provider.as_deref().and_then(parse_price),
                price_suggested: p.price_suggested.as_deref().and_then(parse_price),
                href: p.href.as_deref().map(canonical_url),
                country: p.locale.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(product_id: Option<i64>, stock: Option<i64>) -> ConsolidatedRecord {
        ConsolidatedRecord {
            product: ScrapedProduct {
                provider_name: "Acme".to_string(),
                provider_id: Some(9),
                provider_url: "https://app.example.cl/dashboard/provider/9/acme".to_string(),
                product_id,
                name: "Widget".to_string(),
                category: "Hogar".to_string(),
                price_provider: Some("$ 12.990".to_string()),
                price_suggested: None,
                stock,
                image: None,
                href: Some("https://app.example.cl/dashboard/product-details/451?x=1".to_string()),
                locale: Some("chile".to_string()),
                card_provider_name: None,
                scraped_at: None,
            },
        }
    }

    #[test]
    fn collapse_keeps_most_complete_and_counts_skips() {
        let records = vec![
            record(Some(451), None),
            record(Some(451), Some(12)),
            record(None, Some(1)),
            record(Some(452), None),
        ];
        let ids = vec![Some(1), Some(1), Some(1), None];
        let mut summary = IngestSummary::default();
        let writes = collapse_products(&records, &ids, &mut summary);

        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].stock, Some(12));
        assert_eq!(
            writes[0].href.as_deref(),
            Some("https://app.example.cl/dashboard/product-details/451")
        );
        assert_eq!(writes[0].price_provider, Some(rust_decimal::Decimal::from(12_990)));
        assert_eq!(summary.collapsed_duplicates, 1);
        assert_eq!(summary.skipped_missing_product_id, 1);
    }

    #[test]
    fn batch_size_is_at_least_one() {
        let store = crate::MemoryStore::new();
        let engine = UpsertEngine::new(
            &store,
            UpsertSettings {
                batch_size: 0,
                ..UpsertSettings::default()
            },
        );
        assert_eq!(engine.settings.batch_size, 1);
    }
}
