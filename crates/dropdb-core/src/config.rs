use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_CARD_SELECTORS: &str =
    ".product-card, app-card-product, [data-product-row], .card-box";
pub const DEFAULT_LOAD_MORE_LABELS: &str = "Mostrar más productos,Load more";
pub const DEFAULT_SORT_LABEL: &str = "Más recientes";

const MAX_CONCURRENCY: usize = 5;
const MAX_UPSERT_BATCH_SIZE: usize = 1000;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
        }
    };

    let database_url = lookup("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
    let env = parse_environment(&or_default("DROPDB_ENV", "development"))?;
    let log_level = or_default("DROPDB_LOG_LEVEL", "info");

    let providers_path = PathBuf::from(or_default("DROPDB_PROVIDERS_PATH", "./providers"));
    let out_dir = PathBuf::from(or_default("DROPDB_OUT_DIR", "./out"));

    let headless = parse_bool("DROPDB_HEADLESS", "true")?;
    let browser_profile_dir =
        PathBuf::from(or_default("DROPDB_BROWSER_PROFILE_DIR", "./.dropdb-profile"));
    let chrome_path = lookup("DROPDB_CHROME_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    let concurrency = parse_usize("DROPDB_CONCURRENCY", "1")?;
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(invalid(
            "DROPDB_CONCURRENCY",
            format!("must be between 1 and {MAX_CONCURRENCY}, got {concurrency}"),
        ));
    }

    let nav_timeout_secs = parse_u64("DROPDB_NAV_TIMEOUT_SECS", "90")?;
    let grid_wait_secs = parse_u64("DROPDB_GRID_WAIT_SECS", "15")?;
    let idle_timeout_ms = parse_u64("DROPDB_IDLE_TIMEOUT_MS", "2500")?;
    let provider_timeout_secs = parse_u64("DROPDB_PROVIDER_TIMEOUT_SECS", "900")?;

    let max_no_growth = parse_u32("DROPDB_MAX_NO_GROWTH", "18")?;
    if max_no_growth == 0 {
        return Err(invalid("DROPDB_MAX_NO_GROWTH", "must be at least 1".to_string()));
    }
    let scroll_step_px = parse_u32("DROPDB_SCROLL_STEP_PX", "2800")?;
    let scroll_pause_ms = parse_u64("DROPDB_SCROLL_PAUSE_MS", "900")?;

    let card_selectors = split_list(&or_default("DROPDB_CARD_SELECTORS", DEFAULT_CARD_SELECTORS));
    if card_selectors.is_empty() {
        return Err(invalid(
            "DROPDB_CARD_SELECTORS",
            "at least one selector is required".to_string(),
        ));
    }
    let load_more_labels =
        split_list(&or_default("DROPDB_LOAD_MORE_LABELS", DEFAULT_LOAD_MORE_LABELS));
    let sort_label = Some(or_default("DROPDB_SORT_LABEL", DEFAULT_SORT_LABEL))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let upsert_batch_size = parse_usize("DROPDB_UPSERT_BATCH_SIZE", "700")?;
    if upsert_batch_size == 0 || upsert_batch_size > MAX_UPSERT_BATCH_SIZE {
        return Err(invalid(
            "DROPDB_UPSERT_BATCH_SIZE",
            format!("must be between 1 and {MAX_UPSERT_BATCH_SIZE}, got {upsert_batch_size}"),
        ));
    }
    let store_max_retries = parse_u32("DROPDB_STORE_MAX_RETRIES", "3")?;
    let store_backoff_base_secs = parse_u64("DROPDB_STORE_BACKOFF_BASE_SECS", "2")?;

    let db_max_connections = parse_u32("DROPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("DROPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("DROPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        providers_path,
        out_dir,
        headless,
        browser_profile_dir,
        chrome_path,
        concurrency,
        nav_timeout_secs,
        grid_wait_secs,
        idle_timeout_ms,
        provider_timeout_secs,
        max_no_growth,
        scroll_step_px,
        scroll_pause_ms,
        card_selectors,
        load_more_labels,
        sort_label,
        upsert_batch_size,
        store_max_retries,
        store_backoff_base_secs,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Splits a comma-separated list, dropping blank entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "DROPDB_ENV".to_string(),
            reason: format!("unknown environment {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
