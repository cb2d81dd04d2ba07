//! Provider identity resolution without a stable external key.
//!
//! A record resolves to a stored provider by canonical source URL first,
//! then by `(name, country)` compared case- and whitespace-insensitively.
//! Placeholder names ("Proveedor") are never used as keys; a name is
//! recovered from the provider URL slug instead when possible.

use std::collections::HashMap;

use dropdb_core::urls::{
    canonical_url, is_placeholder_provider_name, normalize_whitespace, provider_name_from_url,
};
use dropdb_core::ScrapedProduct;

use crate::providers::{NewProvider, ProviderPatch, ProviderRow};

/// What a record says about its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderClaim {
    /// Trusted name: never a placeholder.
    pub name: Option<String>,
    /// Name as scraped, for display when nothing better exists.
    pub raw_name: String,
    pub source_url: Option<String>,
    pub country: Option<String>,
    pub source_provider_id: Option<i64>,
}

impl ProviderClaim {
    #[must_use]
    pub fn from_record(product: &ScrapedProduct) -> Self {
        let source_url = Some(product.provider_url.trim())
            .filter(|u| !u.is_empty())
            .map(canonical_url);
        Self {
            name: trusted_name(&product.provider_name, source_url.as_deref()),
            raw_name: normalize_whitespace(&product.provider_name),
            source_url,
            country: product.locale.clone(),
            source_provider_id: product.provider_id,
        }
    }

    #[must_use]
    pub fn from_row(row: &ProviderRow) -> Self {
        Self {
            name: trusted_name(&row.name, row.source_url.as_deref()),
            raw_name: row.name.clone(),
            source_url: row.source_url.as_deref().map(canonical_url),
            country: row.country.clone(),
            source_provider_id: row.source_provider_id,
        }
    }

    /// A claim with neither a trusted name nor a URL cannot identify anything.
    #[must_use]
    pub fn is_identifiable(&self) -> bool {
        self.name.is_some() || self.source_url.is_some()
    }

    /// Copies fields this claim lacks from `other`.
    pub fn absorb(&mut self, other: &ProviderClaim) {
        if self.name.is_none() {
            self.name.clone_from(&other.name);
        }
        if self.source_url.is_none() {
            self.source_url.clone_from(&other.source_url);
        }
        if self.country.is_none() {
            self.country.clone_from(&other.country);
        }
        if self.source_provider_id.is_none() {
            self.source_provider_id = other.source_provider_id;
        }
    }

    #[must_use]
    pub fn to_new_provider(&self) -> NewProvider {
        NewProvider {
            name: self.name.clone().unwrap_or_else(|| self.raw_name.clone()),
            country: self.country.clone(),
            source_url: self.source_url.clone(),
            source_provider_id: self.source_provider_id,
        }
    }

    #[must_use]
    pub fn to_patch(&self) -> ProviderPatch {
        ProviderPatch {
            country: self.country.clone(),
            source_url: self.source_url.clone(),
            source_provider_id: self.source_provider_id,
        }
    }
}

fn trusted_name(raw: &str, source_url: Option<&str>) -> Option<String> {
    if is_placeholder_provider_name(raw) {
        return source_url.and_then(provider_name_from_url);
    }
    Some(normalize_whitespace(raw))
}

fn name_key(name: &str, country: Option<&str>) -> (String, String) {
    (
        normalize_whitespace(name).to_lowercase(),
        country.unwrap_or_default().trim().to_lowercase(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<K> {
    Found(K),
    New,
    Unresolved,
}

/// Lookup tables from identity keys to a handle `K`.
///
/// `K` is a stored provider id, or a slot for a provider not yet written.
/// The first handle registered under a key keeps it.
#[derive(Debug, Clone)]
pub struct ProviderIndex<K = i64> {
    by_url: HashMap<String, K>,
    by_name: HashMap<(String, String), K>,
}

impl<K> Default for ProviderIndex<K> {
    fn default() -> Self {
        Self {
            by_url: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

impl ProviderIndex<i64> {
    #[must_use]
    pub fn from_rows(rows: &[ProviderRow]) -> Self {
        let mut index = Self::default();
        for row in rows {
            index.register(row.id, &ProviderClaim::from_row(row));
        }
        index
    }
}

impl<K: Copy> ProviderIndex<K> {
    /// Registers every key `claim` carries.
    pub fn register(&mut self, handle: K, claim: &ProviderClaim) {
        if let Some(url) = &claim.source_url {
            self.by_url.entry(url.clone()).or_insert(handle);
        }
        if let Some(name) = &claim.name {
            self.by_name
                .entry(name_key(name, claim.country.as_deref()))
                .or_insert(handle);
        }
    }

    #[must_use]
    pub fn lookup(&self, claim: &ProviderClaim) -> Option<K> {
        if let Some(handle) = claim.source_url.as_ref().and_then(|u| self.by_url.get(u)) {
            return Some(*handle);
        }
        let name = claim.name.as_deref()?;
        self.by_name
            .get(&name_key(name, claim.country.as_deref()))
            .copied()
    }

    #[must_use]
    pub fn resolve(&self, claim: &ProviderClaim) -> Resolution<K> {
        if let Some(handle) = self.lookup(claim) {
            return Resolution::Found(handle);
        }
        if claim.is_identifiable() {
            Resolution::New
        } else {
            Resolution::Unresolved
        }
    }
}
