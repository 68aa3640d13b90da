//! Error types for the scanner boundary.
//!
//! Only request-shape problems propagate to the caller; every per-symbol
//! failure is contained inside the scan and reported through
//! `ScanResult::excluded`.

use thiserror::Error;

/// Errors a scan request can be rejected with.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The request resolved to zero symbols
    #[error("Scan universe is empty")]
    EmptyUniverse,

    /// A named universe is not known
    #[error("Unknown universe: {0}")]
    UnknownUniverse(String),

    /// No data could be resolved for a single-symbol request
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// The cache store could not be opened or queried
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ScanError::EmptyUniverse.to_string(), "Scan universe is empty");
        assert!(ScanError::UnknownUniverse("LSE".into())
            .to_string()
            .contains("LSE"));
    }
}
