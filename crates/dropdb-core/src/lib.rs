pub mod app_config;
pub mod config;
pub mod locale;
pub mod prices;
pub mod products;
pub mod providers;
pub mod urls;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use locale::{detect_locale, locale_from_iso2, normalize_locale};
pub use prices::parse_price;
pub use products::{
    completeness, supersedes, ConsolidatedRecord, FieldCounts, ProviderMeta, ProviderRun,
    RawCard, ScrapedProduct, UNCATEGORIZED,
};
pub use providers::{load_provider_targets, parse_provider_list, ProviderTarget};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("no provider URLs found under {path}")]
    NoProviderUrls { path: String },

    #[error("failed to read provider list {path}: {source}")]
    ProviderList {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
