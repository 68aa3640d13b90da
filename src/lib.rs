//! Technical and fundamental stock scanner with a freshness-aware data
//! cache.
//!
//! Price history and fundamentals are pulled from a pluggable market data
//! provider, cached in SQLite, enriched with technical indicators, and
//! filtered by field-based rules.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use marketscan::config::AppConfig;
//! use marketscan::data::{CacheStore, YahooProvider};
//! use marketscan::scanner::{CompareOp, FilterList, FilterRule, FilterValue, ScanRequest, ScannerService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AppConfig::load()?;
//! let store = Arc::new(CacheStore::open(
//!     &config.cache.db_path,
//!     config.cache.price_max_age_days,
//!     config.cache.fundamental_max_age_days,
//! )?);
//! let provider = Arc::new(YahooProvider::with_rate_limit(config.fetch.rate_limit_rpm));
//! let scanner = ScannerService::from_config(provider, store, &config);
//!
//! let request = ScanRequest {
//!     universe: Some("NASDAQ".to_string()),
//!     filters: vec![FilterList {
//!         mode: Default::default(),
//!         rules: vec![FilterRule::new("rsi", CompareOp::Lt, FilterValue::Number(30.0))],
//!     }],
//!     ..Default::default()
//! };
//! let result = scanner.scan(&request).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod scanner;

pub use config::AppConfig;
pub use data::{CacheStore, FundamentalSnapshot, PriceBar, YahooProvider};
pub use error::ScanError;
pub use indicators::{IndicatorConfig, IndicatorSnapshot};
pub use scanner::{ScanRequest, ScanResult, ScannerService};
