//! Technical indicator computation.
//!
//! Derives per-bar indicator rows from OHLCV history. Each indicator is
//! `None` until its warm-up window is satisfied; zeros are never used to
//! stand in for undefined values.

mod engine;

pub use engine::compute;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard moving average windows (fixed, matching the snapshot schema).
pub const SMA_PERIODS: [usize; 4] = [20, 50, 100, 200];

/// Standard exponential moving average spans.
pub const EMA_SPANS: [usize; 4] = [12, 26, 50, 200];

// ============================================================================
// Configuration
// ============================================================================

/// Tunable windows for the indicator engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_std_dev")]
    pub bb_std_dev: f64,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    #[serde(default = "default_adx_period")]
    pub adx_period: usize,

    #[serde(default = "default_stoch_k_period")]
    pub stoch_k_period: usize,
    #[serde(default = "default_stoch_d_period")]
    pub stoch_d_period: usize,

    /// Rolling window (in trading days) for realized volatility
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,

    #[serde(default = "default_volume_sma_period")]
    pub volume_sma_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_std_dev: default_bb_std_dev(),
            atr_period: default_atr_period(),
            adx_period: default_adx_period(),
            stoch_k_period: default_stoch_k_period(),
            stoch_d_period: default_stoch_d_period(),
            volatility_window: default_volatility_window(),
            volume_sma_period: default_volume_sma_period(),
        }
    }
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_std_dev() -> f64 {
    2.0
}

fn default_atr_period() -> usize {
    14
}

fn default_adx_period() -> usize {
    14
}

fn default_stoch_k_period() -> usize {
    14
}

fn default_stoch_d_period() -> usize {
    3
}

fn default_volatility_window() -> usize {
    20
}

fn default_volume_sma_period() -> usize {
    20
}

// ============================================================================
// Snapshot
// ============================================================================

/// One row of derived indicator values, aligned to a price bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    // Trend
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_100: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_200: Option<f64>,

    // Momentum
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,

    // Volatility / bands
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,

    // Trend strength
    pub adx: Option<f64>,
    pub di_plus: Option<f64>,
    pub di_minus: Option<f64>,

    // Volume
    pub obv: Option<f64>,
    pub volume_sma_20: Option<f64>,

    // Returns
    pub daily_return: Option<f64>,
    pub cumulative_return: Option<f64>,
    pub volatility_20d: Option<f64>,
}

impl IndicatorSnapshot {
    /// Create an empty snapshot for a symbol at a timestamp.
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            ..Default::default()
        }
    }
}
