use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CommonError, Result};

/// Public scrape of the 2025 per-city results, one JSON document per city.
pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/cjdeclaro/2025-election-results-web-scrape/refs/heads/main/data/minified_local/";

pub const DEFAULT_CACHE_URL: &str = "sqlite://halalan-cache.db";

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// How long a "dataset unavailable" answer is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeCachePolicy {
    /// Only for the current run; the next run asks the network again.
    #[default]
    Run,
    /// Written to the persistent cache until an explicit clear.
    Persistent,
}

impl FromStr for NegativeCachePolicy {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "persistent" => Ok(Self::Persistent),
            other => Err(CommonError::Config(format!(
                "HALALAN_NEGATIVE_CACHE must be 'run' or 'persistent', got '{other}'"
            ))),
        }
    }
}

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL the `<REGION>/<PROVINCE>/<CITY>.json` paths resolve against.
    pub base_url: String,
    /// sqlx SQLite URL of the persistent cache.
    pub cache_url: String,
    /// Concurrency ceiling for locality processing.
    pub batch_size: usize,
    /// Progress callback cadence, in batches.
    pub progress_every: usize,
    pub negative_cache: NegativeCachePolicy,
    pub http_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_url: DEFAULT_CACHE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: 1,
            negative_cache: NegativeCachePolicy::default(),
            http_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            base_url: env::var("HALALAN_BASE_URL").unwrap_or(defaults.base_url),
            cache_url: env::var("HALALAN_CACHE_URL").unwrap_or(defaults.cache_url),
            batch_size: parsed_env("HALALAN_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            progress_every: parsed_env("HALALAN_PROGRESS_EVERY")?
                .unwrap_or(defaults.progress_every),
            negative_cache: parsed_env("HALALAN_NEGATIVE_CACHE")?
                .unwrap_or(defaults.negative_cache),
            http_timeout_secs: parsed_env("HALALAN_HTTP_TIMEOUT_SECS")?,
        })
    }

    /// Log the effective configuration.
    pub fn log_redacted(&self) {
        info!(
            base_url = %self.base_url,
            cache_url = %self.cache_url,
            batch_size = self.batch_size,
            progress_every = self.progress_every,
            negative_cache = ?self.negative_cache,
            http_timeout_secs = ?self.http_timeout_secs,
            "Config loaded"
        );
    }
}

fn parsed_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CommonError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}
