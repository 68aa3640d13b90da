//! Named scan universes.
//!
//! Built-in exchange lists cover the liquid large caps per venue; callers
//! with their own symbol lists pass them directly in the request instead.

use crate::error::ScanError;

/// Liquid NSE large caps, Yahoo-suffixed.
const NSE_SYMBOLS: &[&str] = &[
    "RELIANCE", "TCS", "HDFCBANK", "INFY", "HINDUNILVR",
    "ICICIBANK", "BHARTIARTL", "ITC", "SBIN", "BAJFINANCE",
    "KOTAKBANK", "LT", "ASIANPAINT", "AXISBANK", "MARUTI",
    "TITAN", "SUNPHARMA", "ULTRACEMCO", "NESTLEIND", "WIPRO",
    "HCLTECH", "TECHM", "POWERGRID", "NTPC", "TATAMOTORS",
    "M&M", "TATASTEEL", "ONGC", "ADANIENT", "ADANIPORTS",
];

/// NASDAQ mega caps (no suffix needed).
const NASDAQ_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA",
    "META", "TSLA", "AVGO", "COST", "NFLX",
    "AMD", "PEP", "ADBE", "CSCO", "CMCSA",
    "INTC", "QCOM", "TMUS", "AMGN", "HON",
    "TXN", "INTU", "AMAT", "SBUX", "ISRG",
    "BKNG", "GILD", "VRTX", "ADI", "MDLZ",
];

/// NYSE blue chips.
const NYSE_SYMBOLS: &[&str] = &[
    "JPM", "V", "WMT", "JNJ", "PG", "MA", "XOM",
    "BAC", "CVX", "ABBV", "KO", "PFE", "MRK", "DIS",
];

/// Resolve a universe name to its symbol list.
///
/// NSE symbols get the ".NS" Yahoo suffix, BSE the ".BO" suffix over the
/// same constituents. Unknown names are an error, never a silent default.
pub fn resolve(name: &str) -> Result<Vec<String>, ScanError> {
    match name.to_uppercase().as_str() {
        "NSE" => Ok(suffixed(NSE_SYMBOLS, ".NS")),
        "BSE" => Ok(suffixed(NSE_SYMBOLS, ".BO")),
        "NASDAQ" => Ok(plain(NASDAQ_SYMBOLS)),
        "NYSE" => Ok(plain(NYSE_SYMBOLS)),
        _ => Err(ScanError::UnknownUniverse(name.to_string())),
    }
}

/// Names of all built-in universes.
pub fn names() -> &'static [&'static str] {
    &["NSE", "BSE", "NASDAQ", "NYSE"]
}

fn suffixed(symbols: &[&str], suffix: &str) -> Vec<String> {
    symbols.iter().map(|s| format!("{}{}", s, suffix)).collect()
}

fn plain(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_universes() {
        let nse = resolve("nse").unwrap();
        assert_eq!(nse.len(), 30);
        assert!(nse.iter().all(|s| s.ends_with(".NS")));

        let bse = resolve("BSE").unwrap();
        assert_eq!(bse[0], "RELIANCE.BO");

        let nasdaq = resolve("NASDAQ").unwrap();
        assert!(nasdaq.contains(&"AAPL".to_string()));

        assert_eq!(resolve("NYSE").unwrap().len(), 14);
    }

    #[test]
    fn test_unknown_universe_is_an_error() {
        match resolve("LSE") {
            Err(ScanError::UnknownUniverse(name)) => assert_eq!(name, "LSE"),
            other => panic!("expected UnknownUniverse, got {:?}", other.map(|v| v.len())),
        }
    }
}
