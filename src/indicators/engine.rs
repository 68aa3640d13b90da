//! Indicator series computation over OHLCV history.
//!
//! All series are computed in one pass over the bars and assembled into
//! per-bar snapshots. Warm-up periods yield `None`, matching how charting
//! platforms leave the head of an indicator blank.

use statrs::statistics::Statistics;
use tracing::debug;

use super::{IndicatorConfig, IndicatorSnapshot, EMA_SPANS, SMA_PERIODS};
use crate::data::PriceBar;

/// Compute one indicator snapshot per input bar.
///
/// Bars must be in ascending timestamp order. Returns an empty vector for
/// empty input.
pub fn compute(bars: &[PriceBar], config: &IndicatorConfig) -> Vec<IndicatorSnapshot> {
    if bars.is_empty() {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let sma: Vec<Vec<Option<f64>>> = SMA_PERIODS
        .iter()
        .map(|&p| sma_series(&closes, p))
        .collect();
    let ema: Vec<Vec<f64>> = EMA_SPANS.iter().map(|&s| ema_series(&closes, s)).collect();

    let rsi = rsi_series(&closes, config.rsi_period);
    let (macd, macd_signal) = macd_series(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    let (bb_upper, bb_middle, bb_lower) = bollinger_series(&closes, config.bb_period, config.bb_std_dev);
    let atr = atr_series(bars, config.atr_period);
    let (adx, di_plus, di_minus) = adx_series(bars, config.adx_period);
    let (stoch_k, stoch_d) = stoch_series(bars, config.stoch_k_period, config.stoch_d_period);
    let obv = obv_series(bars);
    let volume_sma = sma_series(&volumes, config.volume_sma_period);
    let daily_return = return_series(&closes);
    let cumulative_return = cumulative_return_series(&daily_return);
    let volatility = volatility_series(&daily_return, config.volatility_window);

    let mut snapshots = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        snapshots.push(IndicatorSnapshot {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            sma_20: sma[0][i],
            sma_50: sma[1][i],
            sma_100: sma[2][i],
            sma_200: sma[3][i],
            ema_12: Some(ema[0][i]),
            ema_26: Some(ema[1][i]),
            ema_50: Some(ema[2][i]),
            ema_200: Some(ema[3][i]),
            rsi: rsi[i],
            macd: Some(macd[i]),
            macd_signal: Some(macd_signal[i]),
            macd_histogram: Some(macd[i] - macd_signal[i]),
            stoch_k: stoch_k[i],
            stoch_d: stoch_d[i],
            bb_upper: bb_upper[i],
            bb_middle: bb_middle[i],
            bb_lower: bb_lower[i],
            atr: atr[i],
            adx: adx[i],
            di_plus: di_plus[i],
            di_minus: di_minus[i],
            obv: Some(obv[i]),
            volume_sma_20: volume_sma[i],
            daily_return: daily_return[i],
            cumulative_return: cumulative_return[i],
            volatility_20d: volatility[i],
        });
    }

    debug!(
        symbol = %bars[0].symbol,
        bars = bars.len(),
        "Computed indicator snapshots"
    );

    snapshots
}

// ============================================================================
// Moving Averages
// ============================================================================

/// Simple moving average; `None` until the window is full.
fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);

    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }

    out
}

/// Exponential moving average seeded with the first value.
///
/// Defined from bar 0; early values simply carry less smoothing history.
fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());

    let mut ema = values[0];
    out.push(ema);
    for &v in &values[1..] {
        ema = alpha * v + (1.0 - alpha) * ema;
        out.push(ema);
    }

    out
}

// ============================================================================
// Momentum
// ============================================================================

/// Relative Strength Index with Wilder smoothing.
///
/// A window with no movement at all has no meaningful RSI and stays `None`.
fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };

        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_gain == 0.0 && avg_loss == 0.0 {
        return None;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line and signal line.
fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>) {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd, signal);

    (macd, signal_line)
}

/// Stochastic oscillator %K and %D.
fn stoch_series(bars: &[PriceBar], k_period: usize, d_period: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = bars.len();
    let mut k_out = vec![None; n];
    let mut d_out = vec![None; n];
    if k_period == 0 || n < k_period {
        return (k_out, d_out);
    }

    for i in (k_period - 1)..n {
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        if highest > lowest {
            k_out[i] = Some(100.0 * (bars[i].close - lowest) / (highest - lowest));
        }
    }

    for i in 0..n {
        if i + 1 >= d_period {
            let window = &k_out[i + 1 - d_period..=i];
            if window.iter().all(|v| v.is_some()) {
                let sum: f64 = window.iter().flatten().sum();
                d_out[i] = Some(sum / d_period as f64);
            }
        }
    }

    (k_out, d_out)
}

// ============================================================================
// Volatility
// ============================================================================

/// Bollinger Bands: SMA middle with population-std-dev envelopes.
fn bollinger_series(
    closes: &[f64],
    period: usize,
    std_devs: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = closes.len();
    let mut upper = vec![None; n];
    let mut middle = vec![None; n];
    let mut lower = vec![None; n];
    if period == 0 || n < period {
        return (upper, middle, lower);
    }

    for i in (period - 1)..n {
        let window = &closes[i + 1 - period..=i];
        let mean = window.mean();
        let sd = window.population_std_dev();

        middle[i] = Some(mean);
        upper[i] = Some(mean + std_devs * sd);
        lower[i] = Some(mean - std_devs * sd);
    }

    (upper, middle, lower)
}

/// Average True Range with Wilder smoothing.
fn atr_series(bars: &[PriceBar], period: usize) -> Vec<Option<f64>> {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev_close = if i > 0 { Some(bars[i - 1].close) } else { None };
            bar.true_range(prev_close)
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(atr);

    for i in period..n {
        atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = Some(atr);
    }

    out
}

// ============================================================================
// Trend Strength
// ============================================================================

/// ADX with directional indicators, all Wilder-smoothed.
#[allow(clippy::type_complexity)]
fn adx_series(
    bars: &[PriceBar],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = bars.len();
    let mut adx_out = vec![None; n];
    let mut di_plus_out = vec![None; n];
    let mut di_minus_out = vec![None; n];
    if period == 0 || n <= period {
        return (adx_out, di_plus_out, di_minus_out);
    }

    // Directional movement and true range, defined from the second bar
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
        tr[i] = bars[i].true_range(Some(bars[i - 1].close));
    }

    let mut smooth_tr: f64 = tr[1..=period].iter().sum();
    let mut smooth_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[1..=period].iter().sum();

    let mut dx = vec![None; n];
    for i in period..n {
        if i > period {
            smooth_tr = smooth_tr - smooth_tr / period as f64 + tr[i];
            smooth_plus = smooth_plus - smooth_plus / period as f64 + plus_dm[i];
            smooth_minus = smooth_minus - smooth_minus / period as f64 + minus_dm[i];
        }

        if smooth_tr > 0.0 {
            let di_plus = 100.0 * smooth_plus / smooth_tr;
            let di_minus = 100.0 * smooth_minus / smooth_tr;
            di_plus_out[i] = Some(di_plus);
            di_minus_out[i] = Some(di_minus);

            let di_sum = di_plus + di_minus;
            if di_sum > 0.0 {
                dx[i] = Some(100.0 * (di_plus - di_minus).abs() / di_sum);
            }
        }
    }

    // ADX seeds with the mean of the first `period` DX values, then smooths
    let seed_end = 2 * period - 1;
    if seed_end < n {
        let seed: Vec<f64> = (period..=seed_end).filter_map(|i| dx[i]).collect();
        if seed.len() == period {
            let mut adx = seed.iter().sum::<f64>() / period as f64;
            adx_out[seed_end] = Some(adx);

            for i in (seed_end + 1)..n {
                if let Some(d) = dx[i] {
                    adx = (adx * (period as f64 - 1.0) + d) / period as f64;
                    adx_out[i] = Some(adx);
                }
            }
        }
    }

    (adx_out, di_plus_out, di_minus_out)
}

// ============================================================================
// Volume & Returns
// ============================================================================

/// On-balance volume. The first bar has no prior close and counts as an
/// up-close, so OBV starts at the first bar's volume.
fn obv_series(bars: &[PriceBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut obv = bars[0].volume as f64;
    out.push(obv);

    for i in 1..bars.len() {
        let v = bars[i].volume as f64;
        if bars[i].close > bars[i - 1].close {
            obv += v;
        } else if bars[i].close < bars[i - 1].close {
            obv -= v;
        }
        out.push(obv);
    }

    out
}

/// Simple daily returns; `None` at the first bar and across zero closes.
fn return_series(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for i in 1..closes.len() {
        if closes[i - 1] != 0.0 {
            out[i] = Some(closes[i] / closes[i - 1] - 1.0);
        }
    }
    out
}

/// Compounded return since the first bar.
fn cumulative_return_series(returns: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = vec![None; returns.len()];
    let mut cum = 1.0;
    for i in 1..returns.len() {
        match returns[i] {
            Some(r) => {
                cum *= 1.0 + r;
                out[i] = Some(cum - 1.0);
            }
            None => return out,
        }
    }
    out
}

/// Rolling sample standard deviation of daily returns (not annualized).
fn volatility_series(returns: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; returns.len()];
    if window < 2 {
        return out;
    }

    for i in window..returns.len() {
        let slice = &returns[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_some()) {
            let values: Vec<f64> = slice.iter().flatten().copied().collect();
            out[i] = Some(values.std_dev());
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
