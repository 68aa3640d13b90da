//! Data provider abstraction for upstream market data sources.
//!
//! Defines the `MarketDataProvider` trait that all sources implement,
//! giving the fetcher and fundamentals layers a unified interface.

use async_trait::async_trait;
use thiserror::Error;

use super::{FundamentalSnapshot, Interval, Period, PriceBar};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The provider has no data for the requested symbol/window
    #[error("No data: {0}")]
    NoData(String),

    /// Provider is temporarily unavailable (5xx, maintenance)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal provider error (malformed payload, unexpected shape)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying).
    ///
    /// `NoData` and `InvalidRequest` are deterministic; retrying them
    /// only burns rate limit budget.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

// ============================================================================
// Market Data Provider Trait
// ============================================================================

/// Trait for market data providers.
///
/// Implementations fetch price history and fundamental metrics from an
/// upstream source. All methods take `&self`; implementations handle
/// their own throttling internally.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Get the provider name (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Fetch OHLCV history for a symbol.
    ///
    /// Returns bars in ascending timestamp order. An empty response from
    /// the upstream maps to `ProviderError::NoData`.
    async fn get_history(
        &self,
        symbol: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, ProviderError>;

    /// Fetch current fundamental metrics for a symbol.
    ///
    /// Returns `Ok(None)` when the provider responds but carries no
    /// fundamental data for the symbol (e.g., an index or ETF).
    async fn get_fundamentals(
        &self,
        symbol: &str,
    ) -> Result<Option<FundamentalSnapshot>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::RateLimited {
            retry_after_secs: Some(5)
        }
        .is_recoverable());
        assert!(ProviderError::Unavailable("503".into()).is_recoverable());
        assert!(!ProviderError::NoData("ZZZZ".into()).is_recoverable());
        assert!(!ProviderError::InvalidRequest("bad interval".into()).is_recoverable());
        assert!(!ProviderError::Internal("parse".into()).is_recoverable());
    }

    #[test]
    fn test_rate_limited_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(err.to_string().contains("30"));

        let err = ProviderError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Rate limited");
    }
}
