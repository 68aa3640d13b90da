//! Market data layer.
//!
//! Core price/fundamental types, the provider abstraction, the persistent
//! cache, and the retrying batch fetcher.

mod fetcher;
mod fundamentals;
mod provider;
mod rate_limiter;
mod store;
mod yahoo;

pub use fetcher::{BatchOutcome, Fetcher, FetcherConfig};
pub use fundamentals::FundamentalsService;
pub use provider::{MarketDataProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use store::{CacheInfo, CacheMetadata, CacheStore};
pub use yahoo::YahooProvider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// History window requested from a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// 5 trading days
    D5,
    /// 1 month
    M1,
    /// 3 months
    M3,
    /// 6 months
    M6,
    /// 1 year
    Y1,
    /// 2 years
    Y2,
    /// 5 years
    Y5,
    /// 10 years
    Y10,
    /// Year to date
    Ytd,
    /// All available history
    Max,
}

impl Period {
    /// Parse from string (e.g., "1y", "6mo", "max").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "5d" => Some(Self::D5),
            "1mo" => Some(Self::M1),
            "3mo" => Some(Self::M3),
            "6mo" => Some(Self::M6),
            "1y" => Some(Self::Y1),
            "2y" => Some(Self::Y2),
            "5y" => Some(Self::Y5),
            "10y" => Some(Self::Y10),
            "ytd" => Some(Self::Ytd),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Convert to the provider API range string.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::D5 => "5d",
            Self::M1 => "1mo",
            Self::M3 => "3mo",
            Self::M6 => "6mo",
            Self::Y1 => "1y",
            Self::Y2 => "2y",
            Self::Y5 => "5y",
            Self::Y10 => "10y",
            Self::Ytd => "ytd",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_api_str())
    }
}

/// Bar interval requested from a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Hourly bars
    Hourly,
    /// Daily bars
    Daily,
    /// Weekly bars
    Weekly,
    /// Monthly bars
    Monthly,
}

impl Interval {
    /// Parse from string (e.g., "1d", "1wk").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1h" | "60m" => Some(Self::Hourly),
            "1d" | "d" | "daily" => Some(Self::Daily),
            "1wk" | "w" | "weekly" => Some(Self::Weekly),
            "1mo" | "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Convert to the provider API interval string.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Hourly => "1h",
            Self::Daily => "1d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_api_str())
    }
}

/// A single OHLCV observation for one symbol at one timestamp.
///
/// Bars are immutable once stored; a symbol's bars form a replace-only set
/// keyed by (symbol, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    /// Symbol/ticker
    pub symbol: String,
    /// Bar timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price (non-negative)
    pub close: f64,
    /// Volume
    pub volume: u64,
    /// Adjusted close, when the provider supplies one
    #[serde(default)]
    pub adj_close: Option<f64>,
}

impl PriceBar {
    /// Full range of the bar (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range relative to the previous close.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => (self.high - self.low)
                .max((self.high - pc).abs())
                .max((self.low - pc).abs()),
            None => self.high - self.low,
        }
    }
}

/// A point-in-time fundamental record for one symbol.
///
/// Missing metrics are `None`, never zero — a non-dividend payer simply has
/// no dividend yield. History is append-only per symbol; the "current"
/// fundamentals are the most recent snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Symbol/ticker
    pub symbol: String,
    /// Snapshot timestamp (UTC)
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    // Valuation ratios
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub peg_ratio: Option<f64>,

    // Size
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,

    // Leverage & liquidity
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,

    // Profitability
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,

    // Growth
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,

    // Distributions & risk
    pub dividend_yield: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub beta: Option<f64>,

    // Classification
    pub sector: Option<String>,
    pub industry: Option<String>,
}

impl FundamentalSnapshot {
    /// Create an empty snapshot for a symbol, stamped now.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    /// Whether any numeric metric is populated.
    pub fn has_metrics(&self) -> bool {
        self.trailing_pe.is_some()
            || self.forward_pe.is_some()
            || self.price_to_book.is_some()
            || self.price_to_sales.is_some()
            || self.peg_ratio.is_some()
            || self.market_cap.is_some()
            || self.enterprise_value.is_some()
            || self.debt_to_equity.is_some()
            || self.current_ratio.is_some()
            || self.quick_ratio.is_some()
            || self.profit_margin.is_some()
            || self.operating_margin.is_some()
            || self.return_on_assets.is_some()
            || self.return_on_equity.is_some()
            || self.revenue_growth.is_some()
            || self.earnings_growth.is_some()
            || self.dividend_yield.is_some()
            || self.payout_ratio.is_some()
            || self.beta.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
