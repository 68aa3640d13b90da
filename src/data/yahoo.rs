//! Yahoo Finance adapter for global equity market data.
//!
//! # Endpoints
//! - Chart API (`/v8/finance/chart`) for OHLCV history
//! - Quote summary API (`/v10/finance/quoteSummary`) for fundamentals
//!
//! # Rate Limits
//! No published limit; proactive throttling is applied to stay polite
//! and avoid 429 responses during large batch scans.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{MarketDataProvider, ProviderError};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{FundamentalSnapshot, Interval, Period, PriceBar};

// ============================================================================
// Constants
// ============================================================================

/// Yahoo Finance API base URL
const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";

/// Chart (OHLCV history) endpoint
const CHART_ENDPOINT: &str = "/v8/finance/chart";

/// Quote summary (fundamentals) endpoint
const QUOTE_SUMMARY_ENDPOINT: &str = "/v10/finance/quoteSummary";

/// Quote summary modules needed for the fundamental snapshot
const QUOTE_SUMMARY_MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData,assetProfile";

/// Default rate limit (requests per minute)
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;

/// Retry delay after a rate limit error without a Retry-After header (seconds)
const RATE_LIMIT_RETRY_SECS: u64 = 2;

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo Finance adapter.
///
/// Fetches price history and fundamental metrics for any symbol Yahoo
/// covers (US listings plus exchange-suffixed tickers such as
/// "RELIANCE.NS"). Rate limiting is applied proactively.
pub struct YahooProvider {
    /// HTTP client
    client: reqwest::Client,
    /// Rate limiter for proactive throttling
    rate_limiter: SharedRateLimiter,
}

impl YahooProvider {
    /// Create a new adapter with the default rate limit.
    pub fn new() -> Self {
        Self::with_rate_limit(DEFAULT_RATE_LIMIT_RPM)
    }

    /// Create with a custom rate limit.
    pub fn with_rate_limit(rate_limit_rpm: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rate_limiter: shared_limiter("yahoo", rate_limit_rpm),
        }
    }

    /// Execute a GET request and map transport/status failures.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        symbol: &str,
    ) -> Result<T, ProviderError> {
        self.rate_limiter.acquire().await;

        debug!(url = %url, symbol = symbol, "Fetching from Yahoo");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Network("Request timeout".into())
            } else if e.is_connect() {
                ProviderError::Network("Connection failed".into())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NoData(format!("Unknown symbol: {}", symbol)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .or(Some(RATE_LIMIT_RETRY_SECS));
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }

    /// Assemble bars from the parallel arrays of a chart result.
    fn parse_chart(&self, symbol: &str, result: ChartResult) -> Result<Vec<PriceBar>, ProviderError> {
        let timestamps = result.timestamp.unwrap_or_default();
        if timestamps.is_empty() {
            return Err(ProviderError::NoData(format!(
                "No history for symbol: {}",
                symbol
            )));
        }

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Internal("Missing quote block".into()))?;

        let adjclose = result
            .indicators
            .adjclose
            .and_then(|mut blocks| blocks.pop())
            .map(|b| b.adjclose)
            .unwrap_or_default();

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            // Yahoo emits null rows for halted sessions; skip incomplete bars
            let (open, high, low, close) = match (
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
                quote.close.get(i).copied().flatten(),
            ) {
                (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
                _ => continue,
            };

            let timestamp = Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| ProviderError::Internal(format!("Invalid timestamp: {}", ts)))?;

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                timestamp,
                open,
                high,
                low,
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
                adj_close: adjclose.get(i).copied().flatten(),
            });
        }

        if bars.is_empty() {
            return Err(ProviderError::NoData(format!(
                "No complete bars for symbol: {}",
                symbol
            )));
        }

        bars.sort_by_key(|b| b.timestamp);

        Ok(bars)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn get_history(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        if symbol.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("Empty symbol".into()));
        }

        let url = format!(
            "{}{}/{}?range={}&interval={}&includeAdjustedClose=true",
            YAHOO_API_BASE,
            CHART_ENDPOINT,
            symbol,
            period.as_api_str(),
            interval.as_api_str()
        );

        let envelope: ChartEnvelope = self.get_json(&url, symbol).await?;

        if let Some(err) = envelope.chart.error {
            return Err(ProviderError::NoData(format!(
                "{}: {}",
                symbol,
                err.description.unwrap_or_else(|| err.code)
            )));
        }

        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| ProviderError::NoData(format!("No history for symbol: {}", symbol)))?;

        self.parse_chart(symbol, result)
    }

    async fn get_fundamentals(
        &self,
        symbol: &str,
    ) -> Result<Option<FundamentalSnapshot>, ProviderError> {
        if symbol.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("Empty symbol".into()));
        }

        let url = format!(
            "{}{}/{}?modules={}",
            YAHOO_API_BASE, QUOTE_SUMMARY_ENDPOINT, symbol, QUOTE_SUMMARY_MODULES
        );

        let envelope: QuoteSummaryEnvelope = self.get_json(&url, symbol).await?;

        let result = match envelope
            .quote_summary
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut snap = FundamentalSnapshot::new(symbol);

        if let Some(detail) = result.summary_detail {
            snap.trailing_pe = detail.trailing_pe.and_then(|v| v.raw);
            snap.forward_pe = detail.forward_pe.and_then(|v| v.raw);
            snap.market_cap = detail.market_cap.and_then(|v| v.raw);
            snap.dividend_yield = detail.dividend_yield.and_then(|v| v.raw);
            snap.payout_ratio = detail.payout_ratio.and_then(|v| v.raw);
            snap.beta = detail.beta.and_then(|v| v.raw);
        }

        if let Some(stats) = result.default_key_statistics {
            snap.price_to_book = stats.price_to_book.and_then(|v| v.raw);
            snap.peg_ratio = stats.peg_ratio.and_then(|v| v.raw);
            snap.enterprise_value = stats.enterprise_value.and_then(|v| v.raw);
            if snap.forward_pe.is_none() {
                snap.forward_pe = stats.forward_pe.and_then(|v| v.raw);
            }
        }

        if let Some(fin) = result.financial_data {
            snap.price_to_sales = fin.price_to_sales.and_then(|v| v.raw);
            snap.debt_to_equity = fin.debt_to_equity.and_then(|v| v.raw);
            snap.current_ratio = fin.current_ratio.and_then(|v| v.raw);
            snap.quick_ratio = fin.quick_ratio.and_then(|v| v.raw);
            snap.profit_margin = fin.profit_margins.and_then(|v| v.raw);
            snap.operating_margin = fin.operating_margins.and_then(|v| v.raw);
            snap.return_on_assets = fin.return_on_assets.and_then(|v| v.raw);
            snap.return_on_equity = fin.return_on_equity.and_then(|v| v.raw);
            snap.revenue_growth = fin.revenue_growth.and_then(|v| v.raw);
            snap.earnings_growth = fin.earnings_growth.and_then(|v| v.raw);
        }

        if let Some(profile) = result.asset_profile {
            snap.sector = profile.sector;
            snap.industry = profile.industry;
        }

        if !snap.has_metrics() && snap.sector.is_none() {
            return Ok(None);
        }

        Ok(Some(snap))
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteBlock>,
    adjclose: Option<Vec<AdjCloseBlock>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteBlock {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    financial_data: Option<FinancialData>,
    asset_profile: Option<AssetProfile>,
}

/// Yahoo wraps every numeric field as `{"raw": 1.23, "fmt": "1.23"}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    forward_pe: Option<RawValue>,
    market_cap: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    payout_ratio: Option<RawValue>,
    beta: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct KeyStatistics {
    price_to_book: Option<RawValue>,
    peg_ratio: Option<RawValue>,
    enterprise_value: Option<RawValue>,
    forward_pe: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FinancialData {
    #[serde(rename = "priceToSalesTrailing12Months")]
    price_to_sales: Option<RawValue>,
    debt_to_equity: Option<RawValue>,
    current_ratio: Option<RawValue>,
    quick_ratio: Option<RawValue>,
    profit_margins: Option<RawValue>,
    operating_margins: Option<RawValue>,
    return_on_assets: Option<RawValue>,
    return_on_equity: Option<RawValue>,
    revenue_growth: Option<RawValue>,
    earnings_growth: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_result(timestamps: Vec<i64>, closes: Vec<Option<f64>>) -> ChartResult {
        let n = timestamps.len();
        ChartResult {
            timestamp: Some(timestamps),
            indicators: ChartIndicators {
                quote: vec![QuoteBlock {
                    open: vec![Some(1.0); n],
                    high: vec![Some(2.0); n],
                    low: vec![Some(0.5); n],
                    close: closes,
                    volume: vec![Some(100); n],
                }],
                adjclose: None,
            },
        }
    }

    #[test]
    fn test_parse_chart_skips_null_rows() {
        let provider = YahooProvider::new();
        let result = chart_result(
            vec![1_700_000_000, 1_700_086_400, 1_700_172_800],
            vec![Some(1.5), None, Some(1.6)],
        );

        let bars = provider.parse_chart("AAPL", result).unwrap();
        assert_eq!(bars.len(), 2);
        assert!((bars[0].close - 1.5).abs() < 1e-9);
        assert!((bars[1].close - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chart_empty_is_no_data() {
        let provider = YahooProvider::new();
        let result = chart_result(vec![], vec![]);

        match provider.parse_chart("ZZZZ", result) {
            Err(ProviderError::NoData(_)) => {}
            other => panic!("expected NoData, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_chart_envelope_parses() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1700000000],
                    "indicators": {
                        "quote": [{"open": [1.0], "high": [2.0], "low": [0.5], "close": [1.5], "volume": [100]}],
                        "adjclose": [{"adjclose": [1.45]}]
                    }
                }],
                "error": null
            }
        }"#;

        let envelope: ChartEnvelope = serde_json::from_str(json).unwrap();
        let result = envelope.chart.result.unwrap().remove(0);
        assert_eq!(result.timestamp.unwrap(), vec![1_700_000_000]);
    }

    #[test]
    fn test_quote_summary_raw_values_parse() {
        let json = r#"{
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {"trailingPE": {"raw": 25.3, "fmt": "25.30"}},
                    "assetProfile": {"sector": "Technology", "industry": "Consumer Electronics"}
                }]
            }
        }"#;

        let envelope: QuoteSummaryEnvelope = serde_json::from_str(json).unwrap();
        let result = envelope.quote_summary.result.unwrap().remove(0);
        let detail = result.summary_detail.unwrap();
        assert_eq!(detail.trailing_pe.unwrap().raw, Some(25.3));
        assert_eq!(result.asset_profile.unwrap().sector.as_deref(), Some("Technology"));
    }
}
