//! Retrying, cache-aware history fetcher.
//!
//! Wraps a `MarketDataProvider` with the refresh policy: serve fresh cache
//! hits without touching the network, retry transient upstream failures,
//! persist what was fetched, and fall back to stale cache data when the
//! upstream is down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::provider::{MarketDataProvider, ProviderError};
use super::store::CacheStore;
use super::{Interval, Period, PriceBar};
use crate::config::FetchConfig;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime settings for the fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// History window requested from the provider
    pub period: Period,
    /// Bar interval requested from the provider
    pub interval: Interval,
    /// Width of the bounded worker pool for batch fetches
    pub max_workers: usize,
    /// Attempts per symbol before giving up on a transient failure
    pub retry_attempts: u32,
    /// Fixed delay between retry attempts
    pub retry_delay: Duration,
    /// Optional wall-clock budget for a whole batch
    pub batch_deadline: Option<Duration>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            period: Period::Y1,
            interval: Interval::Daily,
            max_workers: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            batch_deadline: None,
        }
    }
}

impl From<&FetchConfig> for FetcherConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            period: Period::parse(&config.period).unwrap_or(Period::Y1),
            interval: Interval::parse(&config.interval).unwrap_or(Interval::Daily),
            max_workers: config.max_workers.max(1),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            batch_deadline: None,
        }
    }
}

// ============================================================================
// Batch Outcome
// ============================================================================

/// Result of a multi-symbol fetch.
///
/// Per-symbol failures never abort the batch; they are collected here so
/// callers can report exactly what was skipped and why.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successfully resolved history per symbol
    pub fetched: HashMap<String, Vec<PriceBar>>,
    /// Symbols that failed, with the final error message
    pub failures: Vec<(String, String)>,
    /// Symbols still in flight when the batch deadline expired
    pub unresolved: Vec<String>,
}

impl BatchOutcome {
    /// Total symbols accounted for.
    pub fn total(&self) -> usize {
        self.fetched.len() + self.failures.len() + self.unresolved.len()
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Cache-aware batch fetcher over a market data provider.
pub struct Fetcher<P> {
    provider: Arc<P>,
    store: Arc<CacheStore>,
    config: FetcherConfig,
}

impl<P: MarketDataProvider + 'static> Fetcher<P> {
    pub fn new(provider: Arc<P>, store: Arc<CacheStore>, config: FetcherConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Get price history for one symbol, preferring the cache.
    ///
    /// Flow: fresh cache hit short-circuits; otherwise fetch with retries,
    /// save, and verify the save by re-reading. If the upstream fails but
    /// stale bars exist, the stale bars are returned with a warning rather
    /// than an error.
    pub async fn fetch_history(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        if !force_refresh {
            match self.store.prices_fresh(symbol).await {
                Ok(true) => {
                    let bars = self.store.load_prices(symbol).await.unwrap_or_default();
                    if !bars.is_empty() {
                        debug!(symbol, count = bars.len(), "Cache hit for price history");
                        return Ok(bars);
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(symbol, error = %e, "Cache freshness check failed"),
            }
        }

        match self.fetch_with_retry(symbol).await {
            Ok(bars) => Ok(self.persist_and_verify(symbol, bars).await),
            Err(e) => {
                // Last resort: serve stale cached bars rather than nothing
                let stale = self.store.load_prices(symbol).await.unwrap_or_default();
                if !stale.is_empty() {
                    warn!(
                        symbol,
                        error = %e,
                        count = stale.len(),
                        "Fetch failed, serving stale cached bars"
                    );
                    return Ok(stale);
                }
                Err(e)
            }
        }
    }

    /// Fetch history for many symbols with bounded parallelism.
    ///
    /// Failures are collected per symbol. When a deadline is given (or
    /// configured), symbols still in flight at expiry land in
    /// `unresolved`; the caller's deadline wins over the configured one.
    pub async fn fetch_many(
        &self,
        symbols: &[String],
        force_refresh: bool,
        deadline: Option<Instant>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if symbols.is_empty() {
            return outcome;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let deadline =
            deadline.or_else(|| self.config.batch_deadline.map(|d| Instant::now() + d));
        let mut join_set: JoinSet<(String, Result<Vec<PriceBar>, ProviderError>)> = JoinSet::new();

        for symbol in symbols {
            let semaphore = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            let symbol = symbol.clone();

            join_set.spawn(async move {
                // Closed only if the set itself is dropped mid-batch
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            symbol,
                            Err(ProviderError::Internal("Worker pool closed".into())),
                        )
                    }
                };

                let fetcher = Fetcher {
                    provider,
                    store,
                    config,
                };
                let result = fetcher.fetch_history(&symbol, force_refresh).await;
                (symbol, result)
            });
        }

        let mut completed: Vec<String> = Vec::with_capacity(symbols.len());

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
                Some(Ok((symbol, Ok(bars)))) => {
                    completed.push(symbol.clone());
                    outcome.fetched.insert(symbol, bars);
                }
                Some(Ok((symbol, Err(e)))) => {
                    completed.push(symbol.clone());
                    outcome.failures.push((symbol, e.to_string()));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Fetch task panicked");
                }
                None => break,
            }
        }

        outcome.unresolved = symbols
            .iter()
            .filter(|s| !completed.contains(s))
            .cloned()
            .collect();

        info!(
            total = symbols.len(),
            fetched = outcome.fetched.len(),
            failed = outcome.failures.len(),
            unresolved = outcome.unresolved.len(),
            "Batch fetch complete"
        );

        outcome
    }

    /// Fetch from the provider, retrying recoverable errors.
    async fn fetch_with_retry(&self, symbol: &str) -> Result<Vec<PriceBar>, ProviderError> {
        let mut last_err = ProviderError::Internal("No attempts made".into());

        for attempt in 1..=self.config.retry_attempts {
            match self
                .provider
                .get_history(symbol, self.config.period, self.config.interval)
                .await
            {
                Ok(bars) => return Ok(bars),
                Err(e) => {
                    if !e.is_recoverable() || attempt == self.config.retry_attempts {
                        return Err(e);
                    }

                    let delay = match &e {
                        ProviderError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => self.config.retry_delay,
                    };

                    warn!(
                        symbol,
                        attempt,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Save fetched bars and verify by re-reading from the cache.
    ///
    /// Storage trouble downgrades to a warning; the fetched bars are
    /// already in hand and the scan should not lose them.
    async fn persist_and_verify(&self, symbol: &str, bars: Vec<PriceBar>) -> Vec<PriceBar> {
        if let Err(e) = self.store.save_prices(symbol, &bars).await {
            warn!(symbol, error = %e, "Failed to persist fetched bars");
            return bars;
        }

        match self.store.load_prices(symbol).await {
            Ok(reread) if !reread.is_empty() => reread,
            Ok(_) => {
                warn!(symbol, "Cache re-read after save came back empty");
                bars
            }
            Err(e) => {
                warn!(symbol, error = %e, "Cache re-read after save failed");
                bars
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
