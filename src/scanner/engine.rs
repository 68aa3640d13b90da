//! Scan orchestration.
//!
//! The central coordinator for multi-symbol scans: resolve the universe,
//! fan out data fetches, assemble one record per symbol, and evaluate
//! the request's filters. Per-symbol failures are reported in the result
//! instead of aborting the scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::data::{
    CacheStore, Fetcher, FetcherConfig, FundamentalsService, MarketDataProvider, PriceBar,
};
use crate::error::ScanError;
use crate::indicators::{self, IndicatorConfig};

use super::fields::SymbolRecord;
use super::filter::{compile_filters, filters_use_fundamentals, record_matches, FilterList};
use super::universe;

// ============================================================================
// Request & Result Types
// ============================================================================

/// A scan request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Explicit symbols to scan; ignored when `universe` is set
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Named universe (e.g., "NSE", "NASDAQ")
    #[serde(default)]
    pub universe: Option<String>,
    /// Filter lists; all lists must pass, rules combine per list mode
    #[serde(default)]
    pub filters: Vec<FilterList>,
    /// Bypass the cache even when fresh
    #[serde(default)]
    pub force_refresh: bool,
    /// Wall-clock budget for the whole scan, in seconds; symbols still
    /// unresolved at expiry are excluded rather than awaited
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A symbol that passed every filter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMatch {
    /// Full data record the filters were evaluated against
    pub record: SymbolRecord,
    /// Human-readable descriptions of the rules this symbol satisfied
    pub matched_rules: Vec<String>,
}

/// A symbol the scan could not evaluate, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// Result of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Matching symbols, in universe order
    pub matched: Vec<ScanMatch>,
    /// Symbols whose data resolved and were evaluated
    pub scanned: usize,
    /// Symbols requested, including excluded ones
    pub requested: usize,
    /// Symbols skipped, with reasons
    pub excluded: Vec<ExcludedSymbol>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScanResult {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {}/{} symbols in {:.1}s: {} matched, {} excluded",
            self.scanned,
            self.requested,
            self.duration_secs,
            self.matched.len(),
            self.excluded.len()
        )
    }
}

/// Detailed view of a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub bar_count: usize,
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    /// Latest close/volume plus indicator and fundamental snapshots
    pub record: SymbolRecord,
}

// ============================================================================
// Scanner Service
// ============================================================================

/// The scan coordinator.
pub struct ScannerService<P: MarketDataProvider + 'static> {
    fetcher: Fetcher<P>,
    fundamentals: FundamentalsService<P>,
    store: Arc<CacheStore>,
    indicator_config: IndicatorConfig,
    max_workers: usize,
}

impl<P: MarketDataProvider + 'static> ScannerService<P> {
    /// Create a scanner from its parts.
    ///
    /// The fetcher's retry policy also governs the fundamentals fetch, so
    /// one config knob covers both upstream paths.
    pub fn new(
        provider: Arc<P>,
        store: Arc<CacheStore>,
        fetcher_config: FetcherConfig,
        indicator_config: IndicatorConfig,
    ) -> Self {
        let max_workers = fetcher_config.max_workers.max(1);
        let fundamentals = FundamentalsService::new(Arc::clone(&provider), Arc::clone(&store))
            .with_retry(fetcher_config.retry_attempts, fetcher_config.retry_delay);
        let fetcher = Fetcher::new(provider, Arc::clone(&store), fetcher_config);

        Self {
            fetcher,
            fundamentals,
            store,
            indicator_config,
            max_workers,
        }
    }

    /// Create a scanner configured from the application config.
    pub fn from_config(provider: Arc<P>, store: Arc<CacheStore>, config: &AppConfig) -> Self {
        Self::new(
            provider,
            store,
            FetcherConfig::from(&config.fetch),
            config.indicators.clone(),
        )
    }

    /// Attach a secondary fundamentals provider used to fill gaps.
    pub fn with_secondary_fundamentals(mut self, secondary: Arc<dyn MarketDataProvider>) -> Self {
        self.fundamentals = self.fundamentals.with_secondary(secondary);
        self
    }

    /// Run a scan.
    ///
    /// Matched symbols come back in universe order, so repeated scans over
    /// the same universe are directly comparable.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let started_at = Utc::now();

        let symbols = self.resolve_universe(request)?;
        let filters = compile_filters(&request.filters);
        let need_fundamentals = filters_use_fundamentals(&filters);
        let deadline = request
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        info!(
            symbols = symbols.len(),
            filter_lists = request.filters.len(),
            force_refresh = request.force_refresh,
            timeout_secs = request.timeout_secs,
            "Starting scan"
        );

        let outcome = self
            .fetcher
            .fetch_many(&symbols, request.force_refresh, deadline)
            .await;

        let mut excluded: Vec<ExcludedSymbol> = outcome
            .failures
            .iter()
            .map(|(symbol, reason)| ExcludedSymbol {
                symbol: symbol.clone(),
                reason: reason.clone(),
            })
            .collect();
        excluded.extend(outcome.unresolved.iter().map(|symbol| ExcludedSymbol {
            symbol: symbol.clone(),
            reason: "Batch deadline exceeded".to_string(),
        }));

        let fetched_symbols: Vec<String> = outcome.fetched.keys().cloned().collect();
        let (mut records, assembly_excluded) = self
            .assemble_records(
                outcome.fetched,
                request.force_refresh,
                need_fundamentals,
                deadline,
            )
            .await;
        excluded.extend(assembly_excluded);

        // Fetched but not assembled before the deadline fired
        for symbol in &fetched_symbols {
            if !records.contains_key(symbol) && !excluded.iter().any(|e| &e.symbol == symbol) {
                excluded.push(ExcludedSymbol {
                    symbol: symbol.clone(),
                    reason: "Batch deadline exceeded".to_string(),
                });
            }
        }

        let scanned = records.len();
        let mut matched = Vec::new();
        for symbol in &symbols {
            let Some(record) = records.remove(symbol) else {
                continue;
            };

            if record_matches(&filters, &record) {
                let matched_rules = filters
                    .iter()
                    .flat_map(|l| l.matched_descriptions(&record))
                    .collect();
                matched.push(ScanMatch {
                    record,
                    matched_rules,
                });
            }
        }

        let completed_at = Utc::now();
        let result = ScanResult {
            matched,
            scanned,
            requested: symbols.len(),
            excluded,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        };

        info!("{}", result.summary());
        Ok(result)
    }

    /// Assemble records for every fetched symbol under the bounded pool.
    ///
    /// Indicator resolution and the fundamentals fetch run in parallel
    /// across symbols, gated by the same worker width and deadline as the
    /// price fetch.
    async fn assemble_records(
        &self,
        fetched: HashMap<String, Vec<PriceBar>>,
        force_refresh: bool,
        include_fundamentals: bool,
        deadline: Option<Instant>,
    ) -> (HashMap<String, SymbolRecord>, Vec<ExcludedSymbol>) {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set: JoinSet<(String, Result<SymbolRecord, String>)> = JoinSet::new();

        for (symbol, bars) in fetched {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let fundamentals = self.fundamentals.clone();
            let indicator_config = self.indicator_config.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (symbol, Err("Assembly pool closed".to_string())),
                };

                let record = assemble_record(
                    &store,
                    &fundamentals,
                    &indicator_config,
                    &symbol,
                    &bars,
                    force_refresh,
                    include_fundamentals,
                )
                .await;
                (symbol, Ok(record))
            });
        }

        let mut records = HashMap::new();
        let mut excluded = Vec::new();

        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            join_set.abort_all();
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            match next {
                Some(Ok((symbol, Ok(record)))) => {
                    records.insert(symbol, record);
                }
                Some(Ok((symbol, Err(reason)))) => {
                    excluded.push(ExcludedSymbol { symbol, reason });
                }
                Some(Err(e)) => warn!(error = %e, "Record assembly task panicked"),
                None => break,
            }
        }

        (records, excluded)
    }

    /// Analyze a single symbol in depth.
    pub async fn analyze(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<SymbolAnalysis, ScanError> {
        let bars = self
            .fetcher
            .fetch_history(symbol, force_refresh)
            .await
            .map_err(|e| ScanError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        let record = assemble_record(
            &self.store,
            &self.fundamentals,
            &self.indicator_config,
            symbol,
            &bars,
            force_refresh,
            true,
        )
        .await;

        Ok(SymbolAnalysis {
            symbol: symbol.to_string(),
            bar_count: bars.len(),
            first_bar: bars.first().map(|b| b.timestamp),
            last_bar: bars.last().map(|b| b.timestamp),
            record,
        })
    }

    /// List the built-in universe names.
    pub fn universes(&self) -> &'static [&'static str] {
        universe::names()
    }

    fn resolve_universe(&self, request: &ScanRequest) -> Result<Vec<String>, ScanError> {
        let mut symbols = match &request.universe {
            Some(name) => universe::resolve(name)?,
            None => request.symbols.clone(),
        };

        // Dedupe while preserving first-seen order
        let mut seen = std::collections::HashSet::new();
        symbols.retain(|s| seen.insert(s.clone()));

        if symbols.is_empty() {
            return Err(ScanError::EmptyUniverse);
        }
        Ok(symbols)
    }
}

/// Build the filterable record for one symbol.
///
/// Indicator rows are reused from the cache when they still line up with
/// the latest bar, otherwise recomputed and persisted. The fundamentals
/// fetch is skipped when nothing will read it; a fundamentals failure
/// downgrades to a record without fundamentals.
async fn assemble_record<P: MarketDataProvider + 'static>(
    store: &CacheStore,
    fundamentals: &FundamentalsService<P>,
    indicator_config: &IndicatorConfig,
    symbol: &str,
    bars: &[PriceBar],
    force_refresh: bool,
    include_fundamentals: bool,
) -> SymbolRecord {
    let last_bar = bars.last();

    let indicator = match last_bar {
        Some(last) => {
            let cached = if force_refresh {
                None
            } else {
                store
                    .load_latest_indicator(symbol)
                    .await
                    .ok()
                    .flatten()
                    .filter(|snap| snap.timestamp == last.timestamp)
            };

            match cached {
                Some(snap) => Some(snap),
                None => {
                    let snapshots = indicators::compute(bars, indicator_config);
                    if let Err(e) = store.save_indicators(symbol, &snapshots).await {
                        warn!(symbol, error = %e, "Failed to persist indicator snapshots");
                    }
                    snapshots.into_iter().last()
                }
            }
        }
        None => None,
    };

    let fundamental = if include_fundamentals {
        match fundamentals.get_fundamentals(symbol, force_refresh).await {
            Ok(snap) => snap,
            Err(e) => {
                warn!(symbol, error = %e, "Fundamentals unavailable for scan record");
                None
            }
        }
    } else {
        None
    };

    SymbolRecord {
        symbol: symbol.to_string(),
        close: last_bar.map(|b| b.close),
        volume: last_bar.map(|b| b.volume),
        indicators: indicator,
        fundamentals: fundamental,
    }
}

// ============================================================================
// Tests
// ============================================================================
