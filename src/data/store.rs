//! Persistent market data cache using SQLite.
//!
//! Stores price bars, indicator snapshots, and fundamental snapshots per
//! symbol, with freshness metadata so callers can decide between cache
//! hits and upstream refreshes. Price and indicator rows are replaced
//! wholesale per symbol; fundamentals are append-only history.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{FundamentalSnapshot, PriceBar};
use crate::indicators::IndicatorSnapshot;

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- OHLCV price bars, replaced wholesale per symbol on refresh
CREATE TABLE IF NOT EXISTS price_bars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    adj_close REAL,
    UNIQUE(symbol, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_price_bars_symbol_ts
ON price_bars(symbol, timestamp DESC);

-- Derived indicator rows, one per bar, replaced together with prices
CREATE TABLE IF NOT EXISTS indicator_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    sma_20 REAL, sma_50 REAL, sma_100 REAL, sma_200 REAL,
    ema_12 REAL, ema_26 REAL, ema_50 REAL, ema_200 REAL,
    rsi REAL,
    macd REAL, macd_signal REAL, macd_histogram REAL,
    bb_upper REAL, bb_middle REAL, bb_lower REAL,
    atr REAL,
    adx REAL, di_plus REAL, di_minus REAL,
    stoch_k REAL, stoch_d REAL,
    obv REAL,
    volume_sma_20 REAL,
    daily_return REAL,
    cumulative_return REAL,
    volatility_20d REAL,
    UNIQUE(symbol, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_indicator_snapshots_symbol_ts
ON indicator_snapshots(symbol, timestamp DESC);

-- Fundamental snapshots, append-only history per symbol
CREATE TABLE IF NOT EXISTS fundamental_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    trailing_pe REAL, forward_pe REAL,
    price_to_book REAL, price_to_sales REAL, peg_ratio REAL,
    market_cap REAL, enterprise_value REAL,
    debt_to_equity REAL, current_ratio REAL, quick_ratio REAL,
    profit_margin REAL, operating_margin REAL,
    return_on_assets REAL, return_on_equity REAL,
    revenue_growth REAL, earnings_growth REAL,
    dividend_yield REAL, payout_ratio REAL, beta REAL,
    sector TEXT, industry TEXT
);

CREATE INDEX IF NOT EXISTS idx_fundamental_snapshots_symbol_ts
ON fundamental_snapshots(symbol, timestamp DESC);

-- Per-symbol refresh bookkeeping for price/indicator data
CREATE TABLE IF NOT EXISTS cache_metadata (
    symbol TEXT PRIMARY KEY,
    last_refresh TEXT NOT NULL,
    bar_count INTEGER NOT NULL,
    first_timestamp TEXT,
    last_timestamp TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
"#;

// ============================================================================
// Metadata Types
// ============================================================================

/// Refresh bookkeeping for one symbol.
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub symbol: String,
    /// When the price/indicator data was last written
    pub last_refresh: DateTime<Utc>,
    /// Number of bars currently stored
    pub bar_count: usize,
    /// Earliest stored bar timestamp
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Latest stored bar timestamp
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Inactive symbols are skipped by maintenance refreshes
    pub active: bool,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone)]
pub struct CacheInfo {
    pub symbols: usize,
    pub price_bars: usize,
    pub indicator_rows: usize,
    pub fundamental_rows: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// Cache Store
// ============================================================================

/// Freshness-aware SQLite cache for market data.
///
/// The connection is wrapped in a Mutex because rusqlite::Connection is
/// Send but not Sync; every save runs inside a transaction so a symbol's
/// data is replaced atomically.
pub struct CacheStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    price_max_age: Duration,
    fundamental_max_age: Duration,
}

impl CacheStore {
    /// Open (or create) a cache database at the given path.
    pub fn open(path: &Path, price_max_age_days: i64, fundamental_max_age_days: i64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open cache database")?;
        Self::init_conn(&conn)?;

        info!(db_path = %path.display(), "Initialized cache store");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
            price_max_age: Duration::days(price_max_age_days),
            fundamental_max_age: Duration::days(fundamental_max_age_days),
        })
    }

    /// Open an in-memory cache (used by tests and one-shot analyses).
    pub fn in_memory(price_max_age_days: i64, fundamental_max_age_days: i64) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init_conn(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
            price_max_age: Duration::days(price_max_age_days),
            fundamental_max_age: Duration::days(fundamental_max_age_days),
        })
    }

    fn init_conn(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;
        Ok(())
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ========================================================================
    // Freshness
    // ========================================================================

    /// Whether a symbol's price/indicator data is present and fresh.
    pub async fn prices_fresh(&self, symbol: &str) -> Result<bool> {
        let meta = self.get_metadata(symbol).await?;
        Ok(match meta {
            Some(m) => m.bar_count > 0 && Utc::now() - m.last_refresh <= self.price_max_age,
            None => false,
        })
    }

    /// Whether a symbol's latest fundamental snapshot is fresh.
    ///
    /// Freshness is judged from the snapshot's own timestamp, so history
    /// imported from elsewhere ages correctly.
    pub async fn fundamentals_fresh(&self, symbol: &str) -> Result<bool> {
        let latest = self.load_latest_fundamental(symbol).await?;
        Ok(match latest {
            Some(snap) => Utc::now() - snap.timestamp <= self.fundamental_max_age,
            None => false,
        })
    }

    // ========================================================================
    // Price Bars
    // ========================================================================

    /// Load all stored bars for a symbol in ascending timestamp order.
    ///
    /// Returns whatever is stored regardless of age; callers gate on
    /// `prices_fresh` when staleness matters.
    pub async fn load_prices(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, timestamp, open, high, low, close, volume, adj_close
             FROM price_bars WHERE symbol = ?1 ORDER BY timestamp ASC",
        )?;

        let bars = stmt
            .query_map(params![symbol], Self::row_to_bar)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(bars)
    }

    fn row_to_bar(row: &rusqlite::Row) -> rusqlite::Result<PriceBar> {
        let timestamp_str: String = row.get(1)?;
        Ok(PriceBar {
            symbol: row.get(0)?,
            timestamp: parse_ts(&timestamp_str),
            open: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            close: row.get(5)?,
            volume: row.get::<_, i64>(6)? as u64,
            adj_close: row.get(7)?,
        })
    }

    /// Replace a symbol's bars and refresh its metadata atomically.
    ///
    /// Returns the number of bars written. An empty slice is a no-op so a
    /// failed fetch can never wipe good data.
    pub async fn save_prices(&self, symbol: &str, bars: &[PriceBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        tx.execute("DELETE FROM price_bars WHERE symbol = ?1", params![symbol])?;

        for bar in bars {
            tx.execute(
                r#"
                INSERT INTO price_bars
                (symbol, timestamp, open, high, low, close, volume, adj_close)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    symbol,
                    bar.timestamp.to_rfc3339(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume as i64,
                    bar.adj_close,
                ],
            )?;
        }

        let first = bars.iter().map(|b| b.timestamp).min();
        let last = bars.iter().map(|b| b.timestamp).max();
        Self::upsert_metadata(&tx, symbol, bars.len(), first, last)?;

        tx.commit()?;

        debug!(symbol, count = bars.len(), "Saved price bars to cache");
        Ok(bars.len())
    }

    // ========================================================================
    // Indicator Snapshots
    // ========================================================================

    /// Load all stored indicator rows for a symbol in ascending order.
    pub async fn load_indicators(&self, symbol: &str) -> Result<Vec<IndicatorSnapshot>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, timestamp,
                    sma_20, sma_50, sma_100, sma_200,
                    ema_12, ema_26, ema_50, ema_200,
                    rsi, macd, macd_signal, macd_histogram,
                    bb_upper, bb_middle, bb_lower,
                    atr, adx, di_plus, di_minus,
                    stoch_k, stoch_d, obv, volume_sma_20,
                    daily_return, cumulative_return, volatility_20d
             FROM indicator_snapshots WHERE symbol = ?1 ORDER BY timestamp ASC",
        )?;

        let rows = stmt
            .query_map(params![symbol], Self::row_to_indicator)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Load only the most recent indicator row for a symbol.
    pub async fn load_latest_indicator(&self, symbol: &str) -> Result<Option<IndicatorSnapshot>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, timestamp,
                    sma_20, sma_50, sma_100, sma_200,
                    ema_12, ema_26, ema_50, ema_200,
                    rsi, macd, macd_signal, macd_histogram,
                    bb_upper, bb_middle, bb_lower,
                    atr, adx, di_plus, di_minus,
                    stoch_k, stoch_d, obv, volume_sma_20,
                    daily_return, cumulative_return, volatility_20d
             FROM indicator_snapshots WHERE symbol = ?1
             ORDER BY timestamp DESC LIMIT 1",
        )?;

        let mut rows = stmt.query_map(params![symbol], Self::row_to_indicator)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_indicator(row: &rusqlite::Row) -> rusqlite::Result<IndicatorSnapshot> {
        let timestamp_str: String = row.get(1)?;
        Ok(IndicatorSnapshot {
            symbol: row.get(0)?,
            timestamp: parse_ts(&timestamp_str),
            sma_20: row.get(2)?,
            sma_50: row.get(3)?,
            sma_100: row.get(4)?,
            sma_200: row.get(5)?,
            ema_12: row.get(6)?,
            ema_26: row.get(7)?,
            ema_50: row.get(8)?,
            ema_200: row.get(9)?,
            rsi: row.get(10)?,
            macd: row.get(11)?,
            macd_signal: row.get(12)?,
            macd_histogram: row.get(13)?,
            bb_upper: row.get(14)?,
            bb_middle: row.get(15)?,
            bb_lower: row.get(16)?,
            atr: row.get(17)?,
            adx: row.get(18)?,
            di_plus: row.get(19)?,
            di_minus: row.get(20)?,
            stoch_k: row.get(21)?,
            stoch_d: row.get(22)?,
            obv: row.get(23)?,
            volume_sma_20: row.get(24)?,
            daily_return: row.get(25)?,
            cumulative_return: row.get(26)?,
            volatility_20d: row.get(27)?,
        })
    }

    /// Replace a symbol's indicator rows atomically.
    pub async fn save_indicators(&self, symbol: &str, snapshots: &[IndicatorSnapshot]) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        tx.execute(
            "DELETE FROM indicator_snapshots WHERE symbol = ?1",
            params![symbol],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO indicator_snapshots
                (symbol, timestamp,
                 sma_20, sma_50, sma_100, sma_200,
                 ema_12, ema_26, ema_50, ema_200,
                 rsi, macd, macd_signal, macd_histogram,
                 bb_upper, bb_middle, bb_lower,
                 atr, adx, di_plus, di_minus,
                 stoch_k, stoch_d, obv, volume_sma_20,
                 daily_return, cumulative_return, volatility_20d)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                        ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)
                "#,
            )?;

            for snap in snapshots {
                stmt.execute(params![
                    symbol,
                    snap.timestamp.to_rfc3339(),
                    snap.sma_20,
                    snap.sma_50,
                    snap.sma_100,
                    snap.sma_200,
                    snap.ema_12,
                    snap.ema_26,
                    snap.ema_50,
                    snap.ema_200,
                    snap.rsi,
                    snap.macd,
                    snap.macd_signal,
                    snap.macd_histogram,
                    snap.bb_upper,
                    snap.bb_middle,
                    snap.bb_lower,
                    snap.atr,
                    snap.adx,
                    snap.di_plus,
                    snap.di_minus,
                    snap.stoch_k,
                    snap.stoch_d,
                    snap.obv,
                    snap.volume_sma_20,
                    snap.daily_return,
                    snap.cumulative_return,
                    snap.volatility_20d,
                ])?;
            }
        }

        tx.commit()?;

        debug!(symbol, count = snapshots.len(), "Saved indicator snapshots to cache");
        Ok(snapshots.len())
    }

    // ========================================================================
    // Fundamental Snapshots
    // ========================================================================

    /// Load the most recent fundamental snapshot for a symbol.
    pub async fn load_latest_fundamental(&self, symbol: &str) -> Result<Option<FundamentalSnapshot>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, timestamp,
                    trailing_pe, forward_pe,
                    price_to_book, price_to_sales, peg_ratio,
                    market_cap, enterprise_value,
                    debt_to_equity, current_ratio, quick_ratio,
                    profit_margin, operating_margin,
                    return_on_assets, return_on_equity,
                    revenue_growth, earnings_growth,
                    dividend_yield, payout_ratio, beta,
                    sector, industry
             FROM fundamental_snapshots WHERE symbol = ?1
             ORDER BY timestamp DESC LIMIT 1",
        )?;

        let mut rows = stmt.query_map(params![symbol], Self::row_to_fundamental)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_fundamental(row: &rusqlite::Row) -> rusqlite::Result<FundamentalSnapshot> {
        let timestamp_str: String = row.get(1)?;
        Ok(FundamentalSnapshot {
            symbol: row.get(0)?,
            timestamp: parse_ts(&timestamp_str),
            trailing_pe: row.get(2)?,
            forward_pe: row.get(3)?,
            price_to_book: row.get(4)?,
            price_to_sales: row.get(5)?,
            peg_ratio: row.get(6)?,
            market_cap: row.get(7)?,
            enterprise_value: row.get(8)?,
            debt_to_equity: row.get(9)?,
            current_ratio: row.get(10)?,
            quick_ratio: row.get(11)?,
            profit_margin: row.get(12)?,
            operating_margin: row.get(13)?,
            return_on_assets: row.get(14)?,
            return_on_equity: row.get(15)?,
            revenue_growth: row.get(16)?,
            earnings_growth: row.get(17)?,
            dividend_yield: row.get(18)?,
            payout_ratio: row.get(19)?,
            beta: row.get(20)?,
            sector: row.get(21)?,
            industry: row.get(22)?,
        })
    }

    /// Append a fundamental snapshot. History is never rewritten.
    pub async fn save_fundamental(&self, snapshot: &FundamentalSnapshot) -> Result<()> {
        let db = self.db.lock().await;

        db.execute(
            r#"
            INSERT INTO fundamental_snapshots
            (symbol, timestamp,
             trailing_pe, forward_pe,
             price_to_book, price_to_sales, peg_ratio,
             market_cap, enterprise_value,
             debt_to_equity, current_ratio, quick_ratio,
             profit_margin, operating_margin,
             return_on_assets, return_on_equity,
             revenue_growth, earnings_growth,
             dividend_yield, payout_ratio, beta,
             sector, industry)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            "#,
            params![
                snapshot.symbol,
                snapshot.timestamp.to_rfc3339(),
                snapshot.trailing_pe,
                snapshot.forward_pe,
                snapshot.price_to_book,
                snapshot.price_to_sales,
                snapshot.peg_ratio,
                snapshot.market_cap,
                snapshot.enterprise_value,
                snapshot.debt_to_equity,
                snapshot.current_ratio,
                snapshot.quick_ratio,
                snapshot.profit_margin,
                snapshot.operating_margin,
                snapshot.return_on_assets,
                snapshot.return_on_equity,
                snapshot.revenue_growth,
                snapshot.earnings_growth,
                snapshot.dividend_yield,
                snapshot.payout_ratio,
                snapshot.beta,
                snapshot.sector,
                snapshot.industry,
            ],
        )?;

        debug!(symbol = %snapshot.symbol, "Saved fundamental snapshot to cache");
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    fn upsert_metadata(
        tx: &rusqlite::Transaction,
        symbol: &str,
        bar_count: usize,
        first: Option<DateTime<Utc>>,
        last: Option<DateTime<Utc>>,
    ) -> rusqlite::Result<()> {
        tx.execute(
            r#"
            INSERT INTO cache_metadata (symbol, last_refresh, bar_count, first_timestamp, last_timestamp, active)
            VALUES (?1, ?2, ?3, ?4, ?5, 1)
            ON CONFLICT(symbol) DO UPDATE SET
                last_refresh = excluded.last_refresh,
                bar_count = excluded.bar_count,
                first_timestamp = excluded.first_timestamp,
                last_timestamp = excluded.last_timestamp,
                active = 1
            "#,
            params![
                symbol,
                Utc::now().to_rfc3339(),
                bar_count as i64,
                first.map(|t| t.to_rfc3339()),
                last.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get refresh metadata for a symbol.
    pub async fn get_metadata(&self, symbol: &str) -> Result<Option<CacheMetadata>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT symbol, last_refresh, bar_count, first_timestamp, last_timestamp, active
             FROM cache_metadata WHERE symbol = ?1",
        )?;

        let mut rows = stmt.query_map(params![symbol], Self::row_to_metadata)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<CacheMetadata> {
        let last_refresh_str: String = row.get(1)?;
        let first_str: Option<String> = row.get(3)?;
        let last_str: Option<String> = row.get(4)?;

        Ok(CacheMetadata {
            symbol: row.get(0)?,
            last_refresh: parse_ts(&last_refresh_str),
            bar_count: row.get::<_, i64>(2)? as usize,
            first_timestamp: first_str.as_deref().map(parse_ts),
            last_timestamp: last_str.as_deref().map(parse_ts),
            active: row.get::<_, i64>(5)? != 0,
        })
    }

    /// List all symbols with cached price data.
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT symbol FROM cache_metadata WHERE active = 1 ORDER BY symbol")?;

        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(symbols)
    }

    /// Mark a symbol active or inactive without touching its data.
    pub async fn set_active(&self, symbol: &str, active: bool) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE cache_metadata SET active = ?2 WHERE symbol = ?1",
            params![symbol, active as i64],
        )?;
        Ok(())
    }

    /// Aggregate statistics over the whole cache.
    pub async fn info(&self) -> Result<CacheInfo> {
        let db = self.db.lock().await;

        let symbols: i64 = db.query_row("SELECT COUNT(*) FROM cache_metadata", [], |r| r.get(0))?;
        let price_bars: i64 = db.query_row("SELECT COUNT(*) FROM price_bars", [], |r| r.get(0))?;
        let indicator_rows: i64 =
            db.query_row("SELECT COUNT(*) FROM indicator_snapshots", [], |r| r.get(0))?;
        let fundamental_rows: i64 =
            db.query_row("SELECT COUNT(*) FROM fundamental_snapshots", [], |r| r.get(0))?;

        Ok(CacheInfo {
            symbols: symbols as usize,
            price_bars: price_bars as usize,
            indicator_rows: indicator_rows as usize,
            fundamental_rows: fundamental_rows as usize,
            db_path: self.db_path.clone(),
        })
    }
}

/// Parse an RFC 3339 timestamp, falling back to now on corrupt rows.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_bar(symbol: &str, day: u32, close: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            adj_close: Some(close),
        }
    }

    #[tokio::test]
    async fn test_price_round_trip() {
        let store = CacheStore::in_memory(1, 30).unwrap();
        let bars = vec![make_bar("AAPL", 2, 10.0), make_bar("AAPL", 1, 9.0)];

        store.save_prices("AAPL", &bars).await.unwrap();

        let loaded = store.load_prices("AAPL").await.unwrap();
        assert_eq!(loaded.len(), 2);
        // Ascending order regardless of insert order
        assert!(loaded[0].timestamp < loaded[1].timestamp);
        assert!((loaded[0].close - 9.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_bars() {
        let store = CacheStore::in_memory(1, 30).unwrap();

        store
            .save_prices("AAPL", &[make_bar("AAPL", 1, 9.0), make_bar("AAPL", 2, 10.0)])
            .await
            .unwrap();
        store
            .save_prices("AAPL", &[make_bar("AAPL", 3, 11.0)])
            .await
            .unwrap();

        let loaded = store.load_prices("AAPL").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].close - 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_save_is_noop() {
        let store = CacheStore::in_memory(1, 30).unwrap();

        store
            .save_prices("AAPL", &[make_bar("AAPL", 1, 9.0)])
            .await
            .unwrap();
        let written = store.save_prices("AAPL", &[]).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(store.load_prices("AAPL").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_freshness_after_save() {
        let store = CacheStore::in_memory(1, 30).unwrap();
        assert!(!store.prices_fresh("AAPL").await.unwrap());

        store
            .save_prices("AAPL", &[make_bar("AAPL", 1, 9.0)])
            .await
            .unwrap();
        assert!(store.prices_fresh("AAPL").await.unwrap());
        assert!(!store.prices_fresh("MSFT").await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_tracks_range() {
        let store = CacheStore::in_memory(1, 30).unwrap();
        store
            .save_prices("AAPL", &[make_bar("AAPL", 1, 9.0), make_bar("AAPL", 5, 10.0)])
            .await
            .unwrap();

        let meta = store.get_metadata("AAPL").await.unwrap().unwrap();
        assert_eq!(meta.bar_count, 2);
        assert!(meta.active);
        assert_eq!(
            meta.first_timestamp.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            meta.last_timestamp.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_fundamental_append_keeps_history() {
        let store = CacheStore::in_memory(1, 30).unwrap();

        let mut old = FundamentalSnapshot::new("AAPL");
        old.timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        old.trailing_pe = Some(20.0);
        store.save_fundamental(&old).await.unwrap();

        let mut newer = FundamentalSnapshot::new("AAPL");
        newer.trailing_pe = Some(25.0);
        store.save_fundamental(&newer).await.unwrap();

        let latest = store.load_latest_fundamental("AAPL").await.unwrap().unwrap();
        assert_eq!(latest.trailing_pe, Some(25.0));

        let info = store.info().await.unwrap();
        assert_eq!(info.fundamental_rows, 2);
    }

    #[tokio::test]
    async fn test_fundamentals_freshness_uses_snapshot_timestamp() {
        let store = CacheStore::in_memory(1, 30).unwrap();

        let mut stale = FundamentalSnapshot::new("AAPL");
        stale.timestamp = Utc::now() - Duration::days(60);
        stale.trailing_pe = Some(20.0);
        store.save_fundamental(&stale).await.unwrap();
        assert!(!store.fundamentals_fresh("AAPL").await.unwrap());

        let mut fresh = FundamentalSnapshot::new("AAPL");
        fresh.trailing_pe = Some(22.0);
        store.save_fundamental(&fresh).await.unwrap();
        assert!(store.fundamentals_fresh("AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_active() {
        let store = CacheStore::in_memory(1, 30).unwrap();
        store
            .save_prices("AAPL", &[make_bar("AAPL", 1, 9.0)])
            .await
            .unwrap();

        store.set_active("AAPL", false).await.unwrap();
        assert!(store.list_symbols().await.unwrap().is_empty());

        store.set_active("AAPL", true).await.unwrap();
        assert_eq!(store.list_symbols().await.unwrap(), vec!["AAPL"]);
    }
}
