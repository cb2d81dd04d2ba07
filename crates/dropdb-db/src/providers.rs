//! Database operations for `providers`.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::DbError;

/// A row from the `providers` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProviderRow {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
    /// Canonical provider page URL.
    pub source_url: Option<String>,
    /// Numeric id the storefront shows in the provider URL, when known.
    pub source_provider_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProvider {
    pub name: String,
    pub country: Option<String>,
    pub source_url: Option<String>,
    pub source_provider_id: Option<i64>,
}

/// Values that may fill an existing provider's empty columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPatch {
    pub country: Option<String>,
    pub source_url: Option<String>,
    pub source_provider_id: Option<i64>,
}

impl ProviderPatch {
    /// The subset of `self` that would change `row`; `None` if nothing would.
    #[must_use]
    pub fn against(&self, row: &ProviderRow) -> Option<ProviderPatch> {
        let patch = ProviderPatch {
            country: self.country.clone().filter(|_| row.country.is_none()),
            source_url: self.source_url.clone().filter(|_| row.source_url.is_none()),
            source_provider_id: self
                .source_provider_id
                .filter(|_| row.source_provider_id.is_none()),
        };
        (patch != ProviderPatch::default()).then_some(patch)
    }

    /// Applies the patch to `row` with fill-only semantics.
    pub fn apply(&self, row: &mut ProviderRow) {
        if row.country.is_none() {
            row.country.clone_from(&self.country);
        }
        if row.source_url.is_none() {
            row.source_url.clone_from(&self.source_url);
        }
        if row.source_provider_id.is_none() {
            row.source_provider_id = self.source_provider_id;
        }
    }
}

/// Returns every provider, ordered by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_providers(pool: &PgPool) -> Result<Vec<ProviderRow>, DbError> {
    let rows = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, name, country, source_url, source_provider_id \
         FROM providers \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Inserts `providers` in one statement and returns the created rows.
///
/// Row order in the result is not guaranteed to match the input.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_providers(
    pool: &PgPool,
    providers: &[NewProvider],
) -> Result<Vec<ProviderRow>, DbError> {
    if providers.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO providers (name, country, source_url, source_provider_id) ");
    qb.push_values(providers, |mut b, p| {
        b.push_bind(&p.name)
            .push_bind(&p.country)
            .push_bind(&p.source_url)
            .push_bind(p.source_provider_id);
    });
    qb.push(" RETURNING id, name, country, source_url, source_provider_id");
    let rows = qb
        .build_query_as::<ProviderRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Fills only the `NULL` columns of each `(id, patch)` pair in one
/// statement.
///
/// Returns the number of rows that changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fill_providers(
    pool: &PgPool,
    patches: &[(i64, ProviderPatch)],
) -> Result<usize, DbError> {
    if patches.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "UPDATE providers SET \
             country            = COALESCE(providers.country, v.country), \
             source_url         = COALESCE(providers.source_url, v.source_url), \
             source_provider_id = COALESCE(providers.source_provider_id, v.source_provider_id), \
             updated_at         = NOW() \
         FROM (",
    );
    qb.push_values(patches, |mut b, (id, patch)| {
        b.push_bind(*id)
            .push_unseparated("::bigint")
            .push_bind(&patch.country)
            .push_unseparated("::text")
            .push_bind(&patch.source_url)
            .push_unseparated("::text")
            .push_bind(patch.source_provider_id)
            .push_unseparated("::bigint");
    });
    qb.push(
        ") AS v (id, country, source_url, source_provider_id) \
         WHERE providers.id = v.id \
           AND ((providers.country IS NULL AND v.country IS NOT NULL) \
             OR (providers.source_url IS NULL AND v.source_url IS NOT NULL) \
             OR (providers.source_provider_id IS NULL AND v.source_provider_id IS NOT NULL))",
    );
    let result = qb.build().execute(pool).await?;
    Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
}
