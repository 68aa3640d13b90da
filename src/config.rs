//! Configuration for the scanner.
//!
//! Settings are deserialized from `~/.marketscan/config.json`; every field
//! has a serde default so a partial or missing file still yields a working
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::indicators::IndicatorConfig;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marketscan")
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Data Fetch
// ============================================================================

/// Configuration for upstream data fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// History window requested from the provider (e.g., "1y", "6mo")
    #[serde(default = "default_period")]
    pub period: String,

    /// Bar interval requested from the provider (e.g., "1d")
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Width of the bounded worker pool for batch fetches
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Attempts per symbol before giving up on a transient failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between retry attempts, in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Proactive rate limit applied to the provider (requests per minute)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            interval: default_interval(),
            max_workers: default_max_workers(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            rate_limit_rpm: default_rate_limit_rpm(),
        }
    }
}

fn default_period() -> String {
    "1y".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_max_workers() -> usize {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_rate_limit_rpm() -> u32 {
    120
}

// ============================================================================
// Cache
// ============================================================================

/// Configuration for the persistent cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Freshness window for price bars and indicator snapshots, in days
    #[serde(default = "default_price_max_age_days")]
    pub price_max_age_days: i64,

    /// Freshness window for fundamental snapshots, in days.
    /// Fundamentals change slowly, so this is much longer than prices.
    #[serde(default = "default_fundamental_max_age_days")]
    pub fundamental_max_age_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            price_max_age_days: default_price_max_age_days(),
            fundamental_max_age_days: default_fundamental_max_age_days(),
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("marketscan.db")
}

fn default_price_max_age_days() -> i64 {
    1
}

fn default_fundamental_max_age_days() -> i64 {
    30
}

// ============================================================================
// Top-level Configuration
// ============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub indicators: IndicatorConfig,
}

impl AppConfig {
    /// Load configuration from the default path.
    ///
    /// A missing file is not an error; defaults are used so the library
    /// stays embeddable without any setup.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Write the configuration to a specific path (creates parent dirs).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fetch.max_workers, 10);
        assert_eq!(config.fetch.retry_attempts, 3);
        assert_eq!(config.cache.price_max_age_days, 1);
        assert_eq!(config.cache.fundamental_max_age_days, 30);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.fetch.period, "1y");
    }

    #[test]
    fn test_partial_config_parses() {
        let json = r#"{"fetch": {"max_workers": 4}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.fetch.max_workers, 4);
        assert_eq!(config.fetch.retry_attempts, 3);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.fetch.period = "6mo".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.fetch.period, "6mo");
    }
}
