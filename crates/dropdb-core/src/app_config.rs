use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    /// Only commands that touch the persistent store require this.
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub providers_path: PathBuf,
    pub out_dir: PathBuf,
    pub headless: bool,
    pub browser_profile_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub concurrency: usize,
    pub nav_timeout_secs: u64,
    pub grid_wait_secs: u64,
    pub idle_timeout_ms: u64,
    pub provider_timeout_secs: u64,
    pub max_no_growth: u32,
    pub scroll_step_px: u32,
    pub scroll_pause_ms: u64,
    pub card_selectors: Vec<String>,
    pub load_more_labels: Vec<String>,
    pub sort_label: Option<String>,
    pub upsert_batch_size: usize,
    pub store_max_retries: u32,
    pub store_backoff_base_secs: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl AppConfig {
    /// The card query as a single CSS selector list.
    #[must_use]
    pub fn card_selector(&self) -> String {
        self.card_selectors.join(", ")
    }

    /// Returns the database URL or the error that aborts store-facing commands.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::MissingEnvVar`] when `DATABASE_URL` is unset.
    pub fn require_database_url(&self) -> Result<&str, crate::ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| crate::ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("providers_path", &self.providers_path)
            .field("out_dir", &self.out_dir)
            .field("headless", &self.headless)
            .field("browser_profile_dir", &self.browser_profile_dir)
            .field("chrome_path", &self.chrome_path)
            .field("concurrency", &self.concurrency)
            .field("nav_timeout_secs", &self.nav_timeout_secs)
            .field("grid_wait_secs", &self.grid_wait_secs)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("max_no_growth", &self.max_no_growth)
            .field("scroll_step_px", &self.scroll_step_px)
            .field("scroll_pause_ms", &self.scroll_pause_ms)
            .field("card_selectors", &self.card_selectors)
            .field("load_more_labels", &self.load_more_labels)
            .field("sort_label", &self.sort_label)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .field("store_max_retries", &self.store_max_retries)
            .field("store_backoff_base_secs", &self.store_backoff_base_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
