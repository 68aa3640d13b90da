//! End-to-end scan flow tests.
//!
//! Exercises the full pipeline against a mock provider and a real SQLite
//! file: fetch, cache, indicator computation, filter evaluation, and the
//! reporting of per-symbol failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use marketscan::data::{
    CacheStore, FetcherConfig, FundamentalSnapshot, Interval, MarketDataProvider, Period,
    PriceBar, ProviderError,
};
use marketscan::indicators::IndicatorConfig;
use marketscan::scanner::{
    CompareOp, FilterList, FilterRule, FilterValue, ScanRequest, ScannerService,
};

// ============================================================================
// Mock Provider
// ============================================================================

/// Provider serving canned data, counting every upstream call.
struct MockProvider {
    history: HashMap<String, Vec<PriceBar>>,
    fundamentals: HashMap<String, FundamentalSnapshot>,
    history_calls: AtomicU32,
}

impl MockProvider {
    fn new(
        history: HashMap<String, Vec<PriceBar>>,
        fundamentals: HashMap<String, FundamentalSnapshot>,
    ) -> Self {
        Self {
            history,
            fundamentals,
            history_calls: AtomicU32::new(0),
        }
    }

    fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_history(
        &self,
        symbol: &str,
        _period: Period,
        _interval: Interval,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.history
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::NoData(format!("Unknown symbol: {}", symbol)))
    }

    async fn get_fundamentals(
        &self,
        symbol: &str,
    ) -> Result<Option<FundamentalSnapshot>, ProviderError> {
        Ok(self.fundamentals.get(symbol).cloned())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A year of daily bars with a steady drift, enough to warm up every
/// indicator including the 200-day SMA.
fn bars(symbol: &str, start_price: f64, daily_drift: f64) -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..250)
        .map(|i| {
            let close = start_price + daily_drift * i as f64;
            PriceBar {
                symbol: symbol.to_string(),
                timestamp: start + chrono::Duration::days(i as i64),
                open: close - daily_drift / 2.0,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 50_000 + (i as u64 % 7) * 1000,
                adj_close: Some(close),
            }
        })
        .collect()
}

fn scanner_with(
    provider: Arc<MockProvider>,
    store: Arc<CacheStore>,
) -> ScannerService<MockProvider> {
    ScannerService::new(
        provider,
        store,
        FetcherConfig {
            retry_delay: std::time::Duration::from_millis(10),
            ..Default::default()
        },
        IndicatorConfig::default(),
    )
}

fn rsi_below(value: f64) -> FilterList {
    FilterList {
        mode: Default::default(),
        rules: vec![FilterRule::new(
            "rsi",
            CompareOp::Lt,
            FilterValue::Number(value),
        )],
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn scan_round_trip_through_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scan.db");
    let store = Arc::new(CacheStore::open(&db_path, 1, 30).unwrap());

    let mut fundamentals = FundamentalSnapshot::new("AAPL");
    fundamentals.trailing_pe = Some(25.0);
    fundamentals.sector = Some("Technology".to_string());

    let provider = Arc::new(MockProvider::new(
        HashMap::from([("AAPL".to_string(), bars("AAPL", 100.0, 0.2))]),
        HashMap::from([("AAPL".to_string(), fundamentals)]),
    ));
    let scanner = scanner_with(Arc::clone(&provider), Arc::clone(&store));

    let request = ScanRequest {
        symbols: vec!["AAPL".to_string()],
        ..Default::default()
    };
    let result = scanner.scan(&request).await.unwrap();

    assert_eq!(result.scanned, 1);
    assert_eq!(result.matched.len(), 1);

    let record = &result.matched[0].record;
    assert_eq!(record.symbol, "AAPL");
    assert!(record.close.is_some());
    assert!(record.indicators.as_ref().unwrap().sma_200.is_some());
    assert_eq!(
        record.fundamentals.as_ref().unwrap().sector.as_deref(),
        Some("Technology")
    );

    // Everything landed on disk
    assert_eq!(store.load_prices("AAPL").await.unwrap().len(), 250);
    assert!(store.load_latest_indicator("AAPL").await.unwrap().is_some());
    assert!(store
        .load_latest_fundamental("AAPL")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn second_scan_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(&dir.path().join("scan.db"), 1, 30).unwrap());

    let provider = Arc::new(MockProvider::new(
        HashMap::from([("AAPL".to_string(), bars("AAPL", 100.0, 0.2))]),
        HashMap::new(),
    ));
    let scanner = scanner_with(Arc::clone(&provider), store);

    let request = ScanRequest {
        symbols: vec!["AAPL".to_string()],
        filters: vec![rsi_below(101.0)],
        ..Default::default()
    };

    let first = scanner.scan(&request).await.unwrap();
    let calls_after_first = provider.history_calls();
    let second = scanner.scan(&request).await.unwrap();

    assert_eq!(provider.history_calls(), calls_after_first);
    assert_eq!(first.matched.len(), second.matched.len());
    assert_eq!(
        first.matched[0].record.indicators.as_ref().unwrap().rsi,
        second.matched[0].record.indicators.as_ref().unwrap().rsi
    );
}

#[tokio::test]
async fn force_refresh_hits_the_provider_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(&dir.path().join("scan.db"), 1, 30).unwrap());

    let provider = Arc::new(MockProvider::new(
        HashMap::from([("AAPL".to_string(), bars("AAPL", 100.0, 0.2))]),
        HashMap::new(),
    ));
    let scanner = scanner_with(Arc::clone(&provider), store);

    let mut request = ScanRequest {
        symbols: vec!["AAPL".to_string()],
        ..Default::default()
    };
    scanner.scan(&request).await.unwrap();
    let calls = provider.history_calls();

    request.force_refresh = true;
    scanner.scan(&request).await.unwrap();
    assert!(provider.history_calls() > calls);
}

#[tokio::test]
async fn failed_symbols_are_excluded_not_fatal() {
    let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());

    // 8 resolvable symbols, 2 unknown to the provider
    let mut history = HashMap::new();
    for i in 0..8 {
        let symbol = format!("OK{}", i);
        history.insert(symbol.clone(), bars(&symbol, 50.0 + i as f64, 0.1));
    }
    let provider = Arc::new(MockProvider::new(history, HashMap::new()));
    let scanner = scanner_with(provider, store);

    let mut symbols: Vec<String> = (0..8).map(|i| format!("OK{}", i)).collect();
    symbols.push("BAD1".to_string());
    symbols.push("BAD2".to_string());

    let result = scanner
        .scan(&ScanRequest {
            symbols,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.requested, 10);
    assert_eq!(result.scanned, 8);
    assert_eq!(result.matched.len(), 8);

    let mut excluded: Vec<&str> = result.excluded.iter().map(|e| e.symbol.as_str()).collect();
    excluded.sort_unstable();
    assert_eq!(excluded, vec!["BAD1", "BAD2"]);
    for e in &result.excluded {
        assert!(e.reason.contains("No data"), "unexpected reason: {}", e.reason);
    }
}

#[tokio::test]
async fn rsi_filter_separates_trending_symbols() {
    let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());

    let provider = Arc::new(MockProvider::new(
        HashMap::from([
            ("RISING".to_string(), bars("RISING", 100.0, 0.5)),
            ("FALLING".to_string(), bars("FALLING", 200.0, -0.5)),
        ]),
        HashMap::new(),
    ));
    let scanner = scanner_with(provider, store);

    let result = scanner
        .scan(&ScanRequest {
            symbols: vec!["RISING".to_string(), "FALLING".to_string()],
            filters: vec![rsi_below(30.0)],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.scanned, 2);
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.matched[0].record.symbol, "FALLING");
}

#[tokio::test]
async fn rule_on_absent_field_matches_nothing() {
    let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());

    // No fundamentals at all, so a P/E rule can never be satisfied
    let provider = Arc::new(MockProvider::new(
        HashMap::from([("AAPL".to_string(), bars("AAPL", 100.0, 0.2))]),
        HashMap::new(),
    ));
    let scanner = scanner_with(provider, store);

    let result = scanner
        .scan(&ScanRequest {
            symbols: vec!["AAPL".to_string()],
            filters: vec![FilterList {
                mode: Default::default(),
                rules: vec![FilterRule::new(
                    "pe",
                    CompareOp::Gt,
                    FilterValue::Number(0.0),
                )],
            }],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.scanned, 1);
    assert!(result.matched.is_empty());
}

#[tokio::test]
async fn analyze_uses_the_same_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(&dir.path().join("scan.db"), 1, 30).unwrap());

    let provider = Arc::new(MockProvider::new(
        HashMap::from([("AAPL".to_string(), bars("AAPL", 100.0, 0.2))]),
        HashMap::new(),
    ));
    let scanner = scanner_with(Arc::clone(&provider), store);

    let analysis = scanner.analyze("AAPL", false).await.unwrap();
    assert_eq!(analysis.bar_count, 250);

    let calls = provider.history_calls();
    scanner.analyze("AAPL", false).await.unwrap();
    assert_eq!(provider.history_calls(), calls);
}
