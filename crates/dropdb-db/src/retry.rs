//! Per-batch retry for transient store failures.
//!
//! Batches are independent units: a retry re-sends one batch only and never
//! assumes earlier batches were rolled back.

use std::future::Future;
use std::time::Duration;

use crate::DbError;

/// SQLSTATE classes worth retrying: connection exceptions (`08`) and
/// transaction rollbacks such as serialization failures and deadlocks (`40`).
const RETRIABLE_SQLSTATE_CLASSES: &[&str] = &["08", "40"];

/// Returns `true` if `err` is transient.
///
/// Capability mismatches ([`DbError::ConflictTargetMissing`]) and constraint
/// violations are never retried.
pub fn is_retriable(err: &DbError) -> bool {
    match err {
        DbError::Unavailable(_) => true,
        DbError::Sqlx(sqlx_err) => match sqlx_err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => db.code().is_some_and(|code| {
                RETRIABLE_SQLSTATE_CLASSES
                    .iter()
                    .any(|class| code.starts_with(class))
            }),
            _ => false,
        },
        _ => false,
    }
}

/// Executes `operation`, sleeping `backoff_base_secs * 2^attempt` seconds
/// between attempts on retriable errors, up to `max_retries` retries after
/// the first try. The last error is returned once retries are exhausted.
///
/// # Errors
///
/// Returns the first non-retriable error, or the last retriable one.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    retry_attempts(max_retries, backoff_base_secs, |_| operation()).await
}

/// Like [`retry_with_backoff`], but passes the zero-based attempt number to
/// `operation`.
///
/// A retriable error does not prove the write was rolled back: the
/// statement may have committed before the connection dropped. Operations
/// that are not idempotent use the attempt number to re-read the store
/// before writing again.
///
/// # Errors
///
/// Returns the first non-retriable error, or the last retriable one.
pub async fn retry_attempts<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, DbError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut last_err;
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                last_err = err;
            }
        }

        // Cap the shift to prevent overflow on extreme configs.
        let delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %last_err,
            "transient store error, retrying batch after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}
