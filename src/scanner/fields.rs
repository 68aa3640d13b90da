//! Filterable fields and the merged per-symbol record.
//!
//! Filters address fields by name; names are resolved once against a
//! closed enum so a typo in a request is caught at compile time of the
//! scan, not deep inside row evaluation.

use serde::{Deserialize, Serialize};

use crate::data::FundamentalSnapshot;
use crate::indicators::IndicatorSnapshot;

// ============================================================================
// Field
// ============================================================================

/// Every field a filter may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    // Price
    Close,
    Volume,

    // Trend
    Sma20,
    Sma50,
    Sma100,
    Sma200,
    Ema12,
    Ema26,
    Ema50,
    Ema200,

    // Momentum
    Rsi,
    Macd,
    MacdSignal,
    MacdHistogram,
    StochK,
    StochD,

    // Volatility / bands
    BbUpper,
    BbMiddle,
    BbLower,
    Atr,
    Volatility20d,

    // Trend strength
    Adx,
    DiPlus,
    DiMinus,

    // Volume / returns
    Obv,
    VolumeSma20,
    DailyReturn,
    CumulativeReturn,

    // Fundamentals
    TrailingPe,
    ForwardPe,
    PriceToBook,
    PriceToSales,
    PegRatio,
    MarketCap,
    EnterpriseValue,
    DebtToEquity,
    CurrentRatio,
    QuickRatio,
    ProfitMargin,
    OperatingMargin,
    ReturnOnAssets,
    ReturnOnEquity,
    RevenueGrowth,
    EarningsGrowth,
    DividendYield,
    PayoutRatio,
    Beta,

    // Classification (text comparisons only)
    Sector,
    Industry,
}

impl Field {
    /// Resolve a request field name, including common aliases, to a field.
    ///
    /// Matching is case-insensitive. Returns `None` for unknown names;
    /// a rule on an unknown field never matches anything.
    pub fn resolve(name: &str) -> Option<Self> {
        let field = match name.to_lowercase().as_str() {
            "close" | "price" | "last_price" => Self::Close,
            "volume" | "vol" => Self::Volume,

            "sma_20" => Self::Sma20,
            "sma_50" => Self::Sma50,
            "sma_100" => Self::Sma100,
            "sma_200" => Self::Sma200,
            "ema_12" => Self::Ema12,
            "ema_26" => Self::Ema26,
            "ema_50" => Self::Ema50,
            "ema_200" => Self::Ema200,

            "rsi" | "rsi_14" => Self::Rsi,
            "macd" | "macd_line" => Self::Macd,
            "macd_signal" => Self::MacdSignal,
            "macd_histogram" | "macd_hist" => Self::MacdHistogram,
            "stoch_k" => Self::StochK,
            "stoch_d" => Self::StochD,

            "bb_upper" => Self::BbUpper,
            "bb_middle" => Self::BbMiddle,
            "bb_lower" => Self::BbLower,
            "atr" => Self::Atr,
            "volatility" | "volatility_20d" => Self::Volatility20d,

            "adx" => Self::Adx,
            "di_plus" => Self::DiPlus,
            "di_minus" => Self::DiMinus,

            "obv" => Self::Obv,
            "volume_sma_20" => Self::VolumeSma20,
            "daily_return" => Self::DailyReturn,
            "cumulative_return" => Self::CumulativeReturn,

            "trailing_pe" | "pe" => Self::TrailingPe,
            "forward_pe" => Self::ForwardPe,
            "price_to_book" | "pb" => Self::PriceToBook,
            "price_to_sales" | "ps" => Self::PriceToSales,
            "peg_ratio" | "peg" => Self::PegRatio,
            "market_cap" | "mcap" => Self::MarketCap,
            "enterprise_value" => Self::EnterpriseValue,
            "debt_to_equity" | "de" => Self::DebtToEquity,
            "current_ratio" => Self::CurrentRatio,
            "quick_ratio" => Self::QuickRatio,
            "profit_margin" => Self::ProfitMargin,
            "operating_margin" => Self::OperatingMargin,
            "return_on_assets" | "roa" => Self::ReturnOnAssets,
            "return_on_equity" | "roe" => Self::ReturnOnEquity,
            "revenue_growth" => Self::RevenueGrowth,
            "earnings_growth" => Self::EarningsGrowth,
            "dividend_yield" | "div_yield" => Self::DividendYield,
            "payout_ratio" => Self::PayoutRatio,
            "beta" => Self::Beta,

            "sector" => Self::Sector,
            "industry" => Self::Industry,

            _ => return None,
        };
        Some(field)
    }

    /// Whether the field holds text rather than a number.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Sector | Self::Industry)
    }

    /// Whether the field comes from the fundamental snapshot.
    pub fn is_fundamental(&self) -> bool {
        matches!(
            self,
            Self::TrailingPe
                | Self::ForwardPe
                | Self::PriceToBook
                | Self::PriceToSales
                | Self::PegRatio
                | Self::MarketCap
                | Self::EnterpriseValue
                | Self::DebtToEquity
                | Self::CurrentRatio
                | Self::QuickRatio
                | Self::ProfitMargin
                | Self::OperatingMargin
                | Self::ReturnOnAssets
                | Self::ReturnOnEquity
                | Self::RevenueGrowth
                | Self::EarningsGrowth
                | Self::DividendYield
                | Self::PayoutRatio
                | Self::Beta
                | Self::Sector
                | Self::Industry
        )
    }
}

// ============================================================================
// Symbol Record
// ============================================================================

/// Everything known about one symbol at scan time: the latest close and
/// volume plus the latest indicator and fundamental snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub indicators: Option<IndicatorSnapshot>,
    pub fundamentals: Option<FundamentalSnapshot>,
}

impl SymbolRecord {
    /// Numeric value of a field, `None` when absent.
    pub fn numeric(&self, field: Field) -> Option<f64> {
        let ind = self.indicators.as_ref();
        let fnd = self.fundamentals.as_ref();

        match field {
            Field::Close => self.close,
            Field::Volume => self.volume.map(|v| v as f64),

            Field::Sma20 => ind?.sma_20,
            Field::Sma50 => ind?.sma_50,
            Field::Sma100 => ind?.sma_100,
            Field::Sma200 => ind?.sma_200,
            Field::Ema12 => ind?.ema_12,
            Field::Ema26 => ind?.ema_26,
            Field::Ema50 => ind?.ema_50,
            Field::Ema200 => ind?.ema_200,

            Field::Rsi => ind?.rsi,
            Field::Macd => ind?.macd,
            Field::MacdSignal => ind?.macd_signal,
            Field::MacdHistogram => ind?.macd_histogram,
            Field::StochK => ind?.stoch_k,
            Field::StochD => ind?.stoch_d,

            Field::BbUpper => ind?.bb_upper,
            Field::BbMiddle => ind?.bb_middle,
            Field::BbLower => ind?.bb_lower,
            Field::Atr => ind?.atr,
            Field::Volatility20d => ind?.volatility_20d,

            Field::Adx => ind?.adx,
            Field::DiPlus => ind?.di_plus,
            Field::DiMinus => ind?.di_minus,

            Field::Obv => ind?.obv,
            Field::VolumeSma20 => ind?.volume_sma_20,
            Field::DailyReturn => ind?.daily_return,
            Field::CumulativeReturn => ind?.cumulative_return,

            Field::TrailingPe => fnd?.trailing_pe,
            Field::ForwardPe => fnd?.forward_pe,
            Field::PriceToBook => fnd?.price_to_book,
            Field::PriceToSales => fnd?.price_to_sales,
            Field::PegRatio => fnd?.peg_ratio,
            Field::MarketCap => fnd?.market_cap,
            Field::EnterpriseValue => fnd?.enterprise_value,
            Field::DebtToEquity => fnd?.debt_to_equity,
            Field::CurrentRatio => fnd?.current_ratio,
            Field::QuickRatio => fnd?.quick_ratio,
            Field::ProfitMargin => fnd?.profit_margin,
            Field::OperatingMargin => fnd?.operating_margin,
            Field::ReturnOnAssets => fnd?.return_on_assets,
            Field::ReturnOnEquity => fnd?.return_on_equity,
            Field::RevenueGrowth => fnd?.revenue_growth,
            Field::EarningsGrowth => fnd?.earnings_growth,
            Field::DividendYield => fnd?.dividend_yield,
            Field::PayoutRatio => fnd?.payout_ratio,
            Field::Beta => fnd?.beta,

            Field::Sector | Field::Industry => None,
        }
    }

    /// Text value of a field, `None` when absent or not a text field.
    pub fn text(&self, field: Field) -> Option<&str> {
        let fnd = self.fundamentals.as_ref()?;
        match field {
            Field::Sector => fnd.sector.as_deref(),
            Field::Industry => fnd.industry.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
