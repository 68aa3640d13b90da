//! Fundamental data service with caching and optional enrichment.
//!
//! Serves the most recent cached snapshot while it is fresh, otherwise
//! fetches from the primary provider. A secondary provider, when
//! configured, fills in metrics the primary left empty; it never
//! overwrites a value the primary supplied.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{MarketDataProvider, ProviderError};
use super::store::CacheStore;
use super::FundamentalSnapshot;

/// Fundamental snapshot resolver over a primary and optional secondary
/// provider.
pub struct FundamentalsService<P> {
    primary: Arc<P>,
    secondary: Option<Arc<dyn MarketDataProvider>>,
    store: Arc<CacheStore>,
    retry_attempts: u32,
    retry_delay: Duration,
}

// Everything inside is shared or copyable, so clones are cheap handles
// suitable for handing to spawned tasks.
impl<P> Clone for FundamentalsService<P> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            secondary: self.secondary.clone(),
            store: Arc::clone(&self.store),
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }
}

impl<P: MarketDataProvider + 'static> FundamentalsService<P> {
    pub fn new(primary: Arc<P>, store: Arc<CacheStore>) -> Self {
        Self {
            primary,
            secondary: None,
            store,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Attach a secondary provider used only to fill gaps.
    pub fn with_secondary(mut self, secondary: Arc<dyn MarketDataProvider>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Get current fundamentals for a symbol, preferring the cache.
    ///
    /// `Ok(None)` means the providers answered but carry no fundamental
    /// data for this symbol; that is a valid state, not an error.
    pub async fn get_fundamentals(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> Result<Option<FundamentalSnapshot>, ProviderError> {
        if !force_refresh {
            match self.store.fundamentals_fresh(symbol).await {
                Ok(true) => {
                    if let Ok(Some(snap)) = self.store.load_latest_fundamental(symbol).await {
                        debug!(symbol, "Cache hit for fundamentals");
                        return Ok(Some(snap));
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(symbol, error = %e, "Fundamentals freshness check failed"),
            }
        }

        match self.fetch_with_retry(symbol).await {
            Ok(Some(mut snap)) => {
                self.enrich(symbol, &mut snap).await;

                if let Err(e) = self.store.save_fundamental(&snap).await {
                    warn!(symbol, error = %e, "Failed to persist fundamental snapshot");
                }
                Ok(Some(snap))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // Serve the stale snapshot rather than nothing
                if let Ok(Some(stale)) = self.store.load_latest_fundamental(symbol).await {
                    warn!(symbol, error = %e, "Fetch failed, serving stale fundamentals");
                    return Ok(Some(stale));
                }
                Err(e)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        symbol: &str,
    ) -> Result<Option<FundamentalSnapshot>, ProviderError> {
        let mut last_err = ProviderError::Internal("No attempts made".into());

        for attempt in 1..=self.retry_attempts {
            match self.primary.get_fundamentals(symbol).await {
                Ok(snap) => return Ok(snap),
                Err(e) => {
                    if !e.is_recoverable() || attempt == self.retry_attempts {
                        return Err(e);
                    }
                    warn!(symbol, attempt, error = %e, "Fundamentals fetch failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Fill empty metrics from the secondary provider, best effort.
    async fn enrich(&self, symbol: &str, snap: &mut FundamentalSnapshot) {
        let Some(secondary) = &self.secondary else {
            return;
        };

        match secondary.get_fundamentals(symbol).await {
            Ok(Some(extra)) => {
                fill_gaps(snap, &extra);
                debug!(symbol, provider = secondary.name(), "Enriched fundamentals");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(symbol, provider = secondary.name(), error = %e, "Enrichment fetch failed");
            }
        }
    }
}

macro_rules! fill_field {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $dst.$field.is_none() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

/// Copy metrics from `src` into fields of `dst` that are still empty.
fn fill_gaps(dst: &mut FundamentalSnapshot, src: &FundamentalSnapshot) {
    fill_field!(
        dst,
        src,
        trailing_pe,
        forward_pe,
        price_to_book,
        price_to_sales,
        peg_ratio,
        market_cap,
        enterprise_value,
        debt_to_equity,
        current_ratio,
        quick_ratio,
        profit_margin,
        operating_margin,
        return_on_assets,
        return_on_equity,
        revenue_growth,
        earnings_growth,
        dividend_yield,
        payout_ratio,
        beta,
        sector,
        industry,
    );
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Interval, Period, PriceBar};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        snapshot: Option<FundamentalSnapshot>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedProvider {
        fn new(snapshot: Option<FundamentalSnapshot>) -> Self {
            Self {
                snapshot,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                snapshot: None,
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn get_history(
            &self,
            _symbol: &str,
            _period: Period,
            _interval: Interval,
        ) -> Result<Vec<PriceBar>, ProviderError> {
            Err(ProviderError::NoData("price data not served".into()))
        }

        async fn get_fundamentals(
            &self,
            _symbol: &str,
        ) -> Result<Option<FundamentalSnapshot>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::NoData("nothing here".into()));
            }
            Ok(self.snapshot.clone())
        }
    }

    fn snapshot_with_pe(symbol: &str, pe: f64) -> FundamentalSnapshot {
        let mut snap = FundamentalSnapshot::new(symbol);
        snap.trailing_pe = Some(pe);
        snap
    }

    #[tokio::test]
    async fn test_fetch_and_cache() {
        let provider = Arc::new(FixedProvider::new(Some(snapshot_with_pe("AAPL", 25.0))));
        let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());
        let service = FundamentalsService::new(Arc::clone(&provider), Arc::clone(&store));

        let snap = service.get_fundamentals("AAPL", false).await.unwrap().unwrap();
        assert_eq!(snap.trailing_pe, Some(25.0));

        // Second call is a cache hit
        service.get_fundamentals("AAPL", false).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // The snapshot was persisted
        let stored = store.load_latest_fundamental("AAPL").await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_none_result_is_not_an_error() {
        let provider = Arc::new(FixedProvider::new(None));
        let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());
        let service = FundamentalsService::new(provider, store);

        let snap = service.get_fundamentals("SPY", false).await.unwrap();
        assert!(snap.is_none());
    }

    #[tokio::test]
    async fn test_stale_fallback_on_failure() {
        let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());
        let mut old = snapshot_with_pe("AAPL", 20.0);
        old.timestamp = chrono::Utc::now() - chrono::Duration::days(90);
        store.save_fundamental(&old).await.unwrap();

        let service = FundamentalsService::new(Arc::new(FixedProvider::failing()), store);

        let snap = service.get_fundamentals("AAPL", false).await.unwrap().unwrap();
        assert_eq!(snap.trailing_pe, Some(20.0));
    }

    #[tokio::test]
    async fn test_secondary_fills_gaps_only() {
        let mut primary_snap = snapshot_with_pe("AAPL", 25.0);
        primary_snap.sector = None;

        let mut secondary_snap = snapshot_with_pe("AAPL", 99.0); // must not win
        secondary_snap.sector = Some("Technology".to_string());
        secondary_snap.price_to_book = Some(8.0);

        let store = Arc::new(CacheStore::in_memory(1, 30).unwrap());
        let service = FundamentalsService::new(
            Arc::new(FixedProvider::new(Some(primary_snap))),
            store,
        )
        .with_secondary(Arc::new(FixedProvider::new(Some(secondary_snap))));

        let snap = service.get_fundamentals("AAPL", false).await.unwrap().unwrap();
        assert_eq!(snap.trailing_pe, Some(25.0));
        assert_eq!(snap.price_to_book, Some(8.0));
        assert_eq!(snap.sector.as_deref(), Some("Technology"));
    }
}
