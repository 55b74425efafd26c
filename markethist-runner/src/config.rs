//! Run configuration: market, transport, batch settings and the item catalog.
//!
//! Stored as TOML. Every section is optional; missing values fall back to the
//! built-in defaults, and a file without `[[games]]` uses the default catalog.

use markethist_core::data::catalog::{Catalog, GameCatalog, ItemIdentity};
use markethist_core::data::fetch::MarketSettings;
use markethist_core::data::rate_limiter::RateLimiter;
use markethist_core::data::transport::RetryPolicy;
use markethist_core::data::writer::file_stem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("'{first}' and '{second}' would both be written to {file}")]
    DuplicateOutput {
        file: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Marketplace currency code (3 = EUR).
    pub currency: u32,
    /// Two-letter country code sent with the most specific candidate.
    pub country: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let settings = MarketSettings::default();
        Self {
            currency: settings.currency,
            country: settings.country,
        }
    }
}

impl MarketConfig {
    pub fn settings(&self) -> MarketSettings {
        MarketSettings {
            currency: self.currency,
            country: self.country.clone(),
        }
    }
}

/// Upper bounds on the backoff curve; each wait is also capped at
/// [`RetryPolicy::MAX_BACKOFF`].
pub const MAX_BACKOFF_BASE: f64 = 10.0;
pub const MAX_BACKOFF_UNIT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub requests_per_minute: u32,
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub backoff_unit_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            max_attempts: 3,
            backoff_base: 2.0,
            backoff_unit_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::per_minute(self.requests_per_minute)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items fetched concurrently. 1 processes the catalog in order.
    pub workers: usize,
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            output_dir: PathBuf::from("data"),
        }
    }
}

/// Everything one batch run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub market: MarketConfig,
    pub transport: TransportConfig,
    pub run: BatchConfig,
    pub games: Vec<GameCatalog>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            transport: TransportConfig::default(),
            run: BatchConfig::default(),
            games: Catalog::default_catalog().games,
        }
    }
}

impl RunConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            games: self.games.clone(),
        }
    }

    pub fn items(&self) -> Vec<ItemIdentity> {
        self.catalog().identities()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transport;
        if t.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "transport.requests_per_minute must be greater than 0".into(),
            ));
        }
        if t.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_attempts must be at least 1".into(),
            ));
        }
        if !(t.backoff_base.is_finite() && (1.0..=MAX_BACKOFF_BASE).contains(&t.backoff_base)) {
            return Err(ConfigError::Invalid(format!(
                "transport.backoff_base must be between 1.0 and {MAX_BACKOFF_BASE}, got {}",
                t.backoff_base
            )));
        }
        if t.backoff_unit_ms > MAX_BACKOFF_UNIT_MS {
            return Err(ConfigError::Invalid(format!(
                "transport.backoff_unit_ms must be at most {MAX_BACKOFF_UNIT_MS}, got {}",
                t.backoff_unit_ms
            )));
        }
        if t.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "transport.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.run.workers == 0 {
            return Err(ConfigError::Invalid("run.workers must be at least 1".into()));
        }
        if self.market.country.trim().is_empty() {
            return Err(ConfigError::Invalid("market.country must not be empty".into()));
        }

        let mut seen: HashMap<String, String> = HashMap::new();
        for item in self.items() {
            if item.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty item name in game {}",
                    item.app_id
                )));
            }
            let file = format!("{}.csv", file_stem(&item));
            if let Some(first) = seen.insert(file.clone(), item.name.clone()) {
                return Err(ConfigError::DuplicateOutput {
                    file,
                    first,
                    second: item.name,
                });
            }
        }
        Ok(())
    }
}
